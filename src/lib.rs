pub mod api;
pub mod contracts;
pub mod format;
pub mod generator;
pub mod metrics;
pub mod scope;
pub mod storage;
