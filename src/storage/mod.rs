mod config_store;
mod file;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocksdb;

pub use config_store::{FileConfigSource, MemoryConfigSource};
pub use file::FileCounterStore;
pub use memory::MemoryCounterStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDbCounterStore;
