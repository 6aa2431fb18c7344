use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::contracts::{CounterRecord, CounterStore, LockResultExt, ScopeKey, StorageError};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout of the counter snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    counters: BTreeMap<ScopeKey, u64>,
}

/// Counter store persisted as a single JSON snapshot.
///
/// Every increment rewrites the snapshot through a temporary file that is
/// fsynced and renamed over the previous one. The in-memory value is only
/// kept if that succeeds, all under one mutex, so a failed write is never
/// visible to other callers.
///
/// The snapshot holds every scope ever issued, one per department per day,
/// and each increment writes all of them. Increment cost therefore grows with
/// the store's age; prefer `RocksDbCounterStore` for long-lived deployments.
pub struct FileCounterStore {
    path: PathBuf,
    counters: Mutex<BTreeMap<ScopeKey, u64>>,
}

impl FileCounterStore {
    /// Opens the snapshot at `path`, recovering existing counters.
    /// Creates the parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let counters = if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StorageError::Serialization(format!(
                    "Unsupported counter snapshot version {}",
                    snapshot.version
                )));
            }
            snapshot.counters
        } else {
            BTreeMap::new()
        };

        tracing::debug!(
            path = %path.display(),
            scopes = counters.len(),
            "Opened counter snapshot"
        );

        Ok(Self {
            path,
            counters: Mutex::new(counters),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, counters: &BTreeMap<ScopeKey, u64>) -> Result<(), StorageError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            counters,
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;

        // The rename is only durable once the directory entry is flushed
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent)?;
        }

        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

/// Borrowing twin of `Snapshot` so persisting doesn't clone the map.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    counters: &'a BTreeMap<ScopeKey, u64>,
}

impl CounterStore for FileCounterStore {
    fn increment(&self, key: &ScopeKey) -> Result<u64, StorageError> {
        let mut counters = self.counters.lock().map_lock_err()?;
        let previous = counters.get(key).copied();
        let next = previous
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| StorageError::Overflow(key.to_string()))?;

        counters.insert(key.clone(), next);
        if let Err(e) = self.persist(&counters) {
            match previous {
                Some(value) => counters.insert(key.clone(), value),
                None => counters.remove(key),
            };
            tracing::error!(scope = %key, error = %e, "Failed to persist counter snapshot");
            return Err(e);
        }

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

    fn ping(&self) -> Result<(), StorageError> {
        let _counters = self.counters.lock().map_lock_err()?;
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) if !parent.is_dir() => Err(StorageError::Io(format!(
                "Counter directory {} is missing",
                parent.display()
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(raw: &str) -> ScopeKey {
        ScopeKey::from_raw(raw)
    }

    #[test]
    fn persistence_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counters.json");

        {
            let store = FileCounterStore::open(&path).unwrap();
            for _ in 0..10 {
                store.increment(&key("mr")).unwrap();
            }
            store.increment(&key("token:20240101:ER")).unwrap();
        }

        {
            let store = FileCounterStore::open(&path).unwrap();
            assert_eq!(store.current(&key("mr")).unwrap(), 10);
            assert_eq!(store.increment(&key("mr")).unwrap(), 11);
            assert_eq!(store.current(&key("token:20240101:ER")).unwrap(), 1);
        }
    }

    #[test]
    fn failed_write_does_not_advance_counter() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("counters.json");

        let store = FileCounterStore::open(&path).unwrap();
        assert_eq!(store.increment(&key("mr")).unwrap(), 1);

        // Pull the directory out from under the store
        fs::remove_dir_all(&data_dir).unwrap();
        assert!(store.increment(&key("mr")).is_err());
        assert!(store.increment(&key("fresh")).is_err());
        assert_eq!(store.current(&key("mr")).unwrap(), 1);
        assert_eq!(store.current(&key("fresh")).unwrap(), 0);
        assert!(store.ping().is_err());

        fs::create_dir_all(&data_dir).unwrap();
        assert_eq!(store.increment(&key("mr")).unwrap(), 2);
        assert_eq!(store.increment(&key("fresh")).unwrap(), 1);
    }

    #[test]
    fn snapshot_is_plain_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counters.json");
        let store = FileCounterStore::open(&path).unwrap();
        store.increment(&key("token:20240101")).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["counters"]["token:20240101"], 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn snapshot_is_written_compact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counters.json");
        let store = FileCounterStore::open(&path).unwrap();
        store.increment(&key("mr")).unwrap();
        store.increment(&key("token:20240101:ER")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            r#"{"version":1,"counters":{"mr":1,"token:20240101:ER":1}}"#
        );
    }

    #[test]
    fn corrupt_snapshot_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counters.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            FileCounterStore::open(&path),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn unknown_snapshot_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counters.json");
        fs::write(&path, br#"{"version": 9, "counters": {}}"#).unwrap();
        assert!(FileCounterStore::open(&path).is_err());
    }
}
