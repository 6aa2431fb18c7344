use crate::contracts::error::StorageError;
use crate::contracts::identifier::{CounterRecord, ScopeKey};

/// Durable scope-key to counter mapping.
///
/// # Invariants
/// - `increment` is atomic: N concurrent callers on one key receive
///   exactly `old+1 ..= old+N`
/// - A value is durable before `increment` returns it
/// - A failed `increment` leaves the stored value unchanged, and no reader
///   observes a value that was not committed
/// - Values never decrease for a key
pub trait CounterStore: Send + Sync {
    /// Reads the value for `key` (0 if absent), stores `value + 1` and returns it.
    fn increment(&self, key: &ScopeKey) -> Result<u64, StorageError>;

    /// Returns the last committed value for `key` without incrementing.
    fn current(&self, key: &ScopeKey) -> Result<u64, StorageError>;

    /// Lists every committed counter, sorted by scope key.
    fn records(&self) -> Result<Vec<CounterRecord>, StorageError>;

    /// Checks that the store is reachable.
    fn ping(&self) -> Result<(), StorageError> {
        self.records().map(|_| ())
    }
}

impl<S: CounterStore + ?Sized> CounterStore for std::sync::Arc<S> {
    fn increment(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        (**self).increment(key)
    }

    fn current(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        (**self).current(key)
    }

    fn records(&self) -> Result<Vec<CounterRecord>, StorageError> {
        (**self).records()
    }

    fn ping(&self) -> Result<(), StorageError> {
        (**self).ping()
    }
}
