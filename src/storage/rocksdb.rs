use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;

use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};

use crate::contracts::{CounterRecord, CounterStore, LockResultExt, ScopeKey, StorageError};

/// Key prefix for counter values
const COUNTER_PREFIX: &str = "ctr";

/// Number of increment locks. Scopes hash onto a fixed set, so the lock
/// table stays the same size however many scopes accumulate.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed counter store.
///
/// Increments take the scope's striped lock, read the committed value, and
/// write the new one with a synced WAL before returning. Scopes on different
/// stripes never contend.
pub struct RocksDbCounterStore {
    db: DB,
    locks: Vec<Mutex<()>>,
}

impl RocksDbCounterStore {
    /// Opens or creates a RocksDB counter store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Counters are tiny; keep the footprint small
        opts.set_write_buffer_size(4 * 1024 * 1024);
        opts.set_max_write_buffer_number(2);
        opts.set_wal_dir(path.join("wal"));

        let db = DB::open(&opts, path).map_err(|e| StorageError::RocksDb(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened RocksDB counter store");

        Ok(Self {
            db,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Creates a counter key. Format: ctr:{scope}
    fn counter_key(scope: &ScopeKey) -> String {
        format!("{}:{}", COUNTER_PREFIX, scope)
    }

    /// Write options with a synced WAL: the value is durable once `put` returns.
    fn write_options() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    /// Parses a u64 from big-endian bytes.
    #[inline]
    fn parse_u64_be(bytes: &[u8]) -> Result<u64, StorageError> {
        bytes
            .try_into()
            .map(u64::from_be_bytes)
            .map_err(|_| StorageError::Serialization("Invalid u64 bytes".into()))
    }

    fn get_u64(&self, key: &str) -> Result<Option<u64>, StorageError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::parse_u64_be(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::RocksDb(e.to_string())),
        }
    }

    fn scope_lock(&self, scope: &ScopeKey) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        scope.hash(&mut hasher);
        &self.locks[hasher.finish() as usize % self.locks.len()]
    }
}

impl CounterStore for RocksDbCounterStore {
    fn increment(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        let _guard = self.scope_lock(key).lock().map_lock_err()?;

        let db_key = Self::counter_key(key);
        let next = self
            .get_u64(&db_key)?
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| StorageError::Overflow(key.to_string()))?;

        self.db
            .put_opt(db_key.as_bytes(), next.to_be_bytes(), &Self::write_options())
            .map_err(|e| StorageError::RocksDb(e.to_string()))?;

        Ok(next)
    }

    fn current(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        Ok(self.get_u64(&Self::counter_key(key))?.unwrap_or(0))
    }

    fn records(&self) -> Result<Vec<CounterRecord>, StorageError> {
        let prefix = format!("{}:", COUNTER_PREFIX);
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::RocksDb(e.to_string()))?;
            let key = String::from_utf8_lossy(&key);
            let Some(scope) = key.strip_prefix(&prefix) else {
                break;
            };
            records.push(CounterRecord {
                scope: ScopeKey::from_raw(scope),
                value: Self::parse_u64_be(&value)?,
            });
        }
        Ok(records)
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.db
            .property_value("rocksdb.estimate-num-keys")
            .map(|_| ())
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksDbCounterStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbCounterStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn key(raw: &str) -> ScopeKey {
        ScopeKey::from_raw(raw)
    }

    #[test]
    fn increment_returns_consecutive_values() {
        let (store, _dir) = create_test_store();
        for expected in 1..=50 {
            assert_eq!(store.increment(&key("mr")).unwrap(), expected);
        }
        assert_eq!(store.current(&key("mr")).unwrap(), 50);
    }

    #[test]
    fn absent_scope_reads_zero() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.current(&key("token:20240101")).unwrap(), 0);
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn records_lists_counters_in_key_order() {
        let (store, _dir) = create_test_store();
        store.increment(&key("token:20240101:LAB")).unwrap();
        store.increment(&key("token:20240101:ER")).unwrap();
        store.increment(&key("token:20240101:ER")).unwrap();
        store.increment(&key("mr")).unwrap();

        let records = store.records().unwrap();
        assert_eq!(
            records,
            vec![
                CounterRecord {
                    scope: key("mr"),
                    value: 1
                },
                CounterRecord {
                    scope: key("token:20240101:ER"),
                    value: 2
                },
                CounterRecord {
                    scope: key("token:20240101:LAB"),
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksDbCounterStore::open(dir.path()).unwrap();
            for _ in 0..25 {
                store.increment(&key("mr")).unwrap();
            }
        }
        let store = RocksDbCounterStore::open(dir.path()).unwrap();
        assert_eq!(store.increment(&key("mr")).unwrap(), 26);
    }

    #[test]
    fn corrupt_value_is_a_serialization_error() {
        let (store, _dir) = create_test_store();
        store.db.put(b"ctr:mr", b"abc").unwrap();
        assert!(matches!(
            store.increment(&key("mr")),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn overflow_is_rejected_without_writing() {
        let (store, _dir) = create_test_store();
        store.db.put(b"ctr:mr", u64::MAX.to_be_bytes()).unwrap();
        assert!(matches!(
            store.increment(&key("mr")),
            Err(StorageError::Overflow(_))
        ));
        assert_eq!(store.current(&key("mr")).unwrap(), u64::MAX);
    }

    #[test]
    fn lock_table_does_not_grow_with_scopes() {
        let (store, _dir) = create_test_store();
        for day in 1..=28 {
            for dept in ["ER", "LAB", "OPD", "RAD"] {
                store
                    .increment(&key(&format!("token:202402{:02}:{}", day, dept)))
                    .unwrap();
            }
        }
        assert_eq!(store.locks.len(), LOCK_STRIPES);
        assert_eq!(store.records().unwrap().len(), 28 * 4);
        // A scope always lands on the same stripe
        let scope = key("token:20240201:ER");
        assert!(std::ptr::eq(store.scope_lock(&scope), store.scope_lock(&scope)));
    }

    #[test]
    fn ping_succeeds_on_open_store() {
        let (store, _dir) = create_test_store();
        store.ping().unwrap();
    }
}
