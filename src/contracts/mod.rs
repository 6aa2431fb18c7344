pub mod config;
pub mod counter;
pub mod error;
pub mod identifier;

pub use config::{FormatConfig, FormatConfigSource, MAX_DIGIT_COUNT};
pub use counter::CounterStore;
pub use error::{ConfigError, GenerateError, LockResultExt, ScopeError, StorageError};
pub use identifier::{
    CounterRecord, Family, GeneratedIdentifier, ReservedSequence, ScopeKey, ScopeKind,
};
