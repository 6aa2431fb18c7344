use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::contracts::{CounterRecord, CounterStore, LockResultExt, ScopeKey, StorageError};

/// Mutex-guarded in-memory counter store.
///
/// Not durable: counters are lost when the process exits. Used in tests and
/// for ephemeral deployments (`MEDSEQ_STORE=memory`).
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<BTreeMap<ScopeKey, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with existing counter values.
    pub fn with_records(records: impl IntoIterator<Item = CounterRecord>) -> Self {
        Self {
            counters: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.scope, record.value))
                    .collect(),
            ),
        }
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        let mut counters = self.counters.lock().map_lock_err()?;
        let value = counters.entry(key.clone()).or_insert(0);
        let next = value
            .checked_add(1)
            .ok_or_else(|| StorageError::Overflow(key.to_string()))?;
        *value = next;
        Ok(next)
    }

    fn current(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        let counters = self.counters.lock().map_lock_err()?;
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    fn records(&self) -> Result<Vec<CounterRecord>, StorageError> {
        let counters = self.counters.lock().map_lock_err()?;
        Ok(counters
            .iter()
            .map(|(scope, value)| CounterRecord {
                scope: scope.clone(),
                value: *value,
            })
            .collect())
    }
}
