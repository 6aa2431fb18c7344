//! Concurrency tests for medseq counter stores and the generator.
//!
//! These tests verify that no sequence is issued twice under concurrent access.
//! Run with: cargo test --test concurrency_tests

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use tempfile::TempDir;

use medseq::contracts::{CounterStore, ScopeKey, ScopeKind};
use medseq::generator::{GeneratorConfig, IdentifierGenerator};
use medseq::storage::{FileCounterStore, MemoryConfigSource, MemoryCounterStore};

/// Hammers one key from `threads` threads and returns every value issued.
fn parallel_increments<S: CounterStore + 'static>(
    store: Arc<S>,
    key: &str,
    threads: usize,
    per_thread: usize,
) -> Vec<u64> {
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let s = Arc::clone(&store);
            let key = ScopeKey::from_raw(key);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|_| s.increment(&key).expect("increment should succeed"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

fn assert_contiguous(mut values: Vec<u64>, expected: usize) {
    values.sort_unstable();
    let len_before = values.len();
    values.dedup();
    assert_eq!(values.len(), len_before, "Found duplicate sequences");
    assert_eq!(values, (1..=expected as u64).collect::<Vec<_>>());
}

// =============================================================================
// Parallel Increment Tests
// =============================================================================

/// N concurrent increments on one key yield exactly 1..=N.
#[test]
fn memory_store_parallel_increments_are_contiguous() {
    let store = Arc::new(MemoryCounterStore::new());
    let values = parallel_increments(Arc::clone(&store), "token:20240301:ER", 10, 100);
    assert_contiguous(values, 1000);
    assert_eq!(
        store.current(&ScopeKey::from_raw("token:20240301:ER")).unwrap(),
        1000
    );
}

#[test]
fn file_store_parallel_increments_are_contiguous() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileCounterStore::open(dir.path().join("counters.json")).unwrap());
    let values = parallel_increments(store, "mr", 8, 25);
    assert_contiguous(values, 200);
}

#[cfg(feature = "rocksdb")]
#[test]
fn rocksdb_store_parallel_increments_are_contiguous() {
    use medseq::storage::RocksDbCounterStore;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbCounterStore::open(dir.path()).unwrap());
    let values = parallel_increments(store, "mr", 10, 50);
    assert_contiguous(values, 500);
}

/// Threads working on different scopes never see each other's values.
#[test]
fn parallel_increments_on_different_scopes_are_isolated() {
    let store = Arc::new(MemoryCounterStore::new());
    let scopes = ["token:20240301:ER", "token:20240301:LAB", "token:20240301:OPD"];

    let handles: Vec<_> = scopes
        .iter()
        .map(|scope| {
            let s = Arc::clone(&store);
            let key = ScopeKey::from_raw(*scope);
            thread::spawn(move || {
                (0..200)
                    .map(|_| s.increment(&key).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        // Each thread is the sole writer of its scope, so it sees 1..=200 in order
        let values = handle.join().unwrap();
        assert_eq!(values, (1..=200).collect::<Vec<_>>());
    }
}

// =============================================================================
// Generator Tests
// =============================================================================

/// Concurrent `next` calls on a multi-threaded runtime issue distinct identifiers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_next_calls_issue_distinct_identifiers() {
    let generator = Arc::new(
        IdentifierGenerator::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryConfigSource::new()),
            GeneratorConfig::default(),
        )
        .unwrap(),
    );
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

    let calls = (0..200).map(|_| {
        let generator = Arc::clone(&generator);
        tokio::spawn(async move {
            generator
                .next_at("token", ScopeKind::Department, Some("ER"), now)
                .await
                .unwrap()
        })
    });

    let issued: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let formatted: HashSet<_> = issued.iter().map(|id| id.formatted.clone()).collect();
    assert_eq!(formatted.len(), 200, "Found duplicate identifiers");
    assert_contiguous(issued.iter().map(|id| id.sequence).collect(), 200);
    assert!(formatted.contains("TKN-2024-0200"));
}

/// Departments issued concurrently keep independent sequences.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_departments_count_independently() {
    let generator = Arc::new(
        IdentifierGenerator::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryConfigSource::new()),
            GeneratorConfig::default(),
        )
        .unwrap(),
    );
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

    let calls = (0..100).map(|i| {
        let generator = Arc::clone(&generator);
        let dept = if i % 2 == 0 { "ER" } else { "LAB" };
        tokio::spawn(async move {
            generator
                .next_at("token", ScopeKind::Department, Some(dept), now)
                .await
                .unwrap()
        })
    });

    let issued: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    for dept in ["ER", "LAB"] {
        let scope = format!("token:20240301:{}", dept);
        let values = issued
            .iter()
            .filter(|id| id.scope.as_str() == scope)
            .map(|id| id.sequence)
            .collect();
        assert_contiguous(values, 50);
    }
}
