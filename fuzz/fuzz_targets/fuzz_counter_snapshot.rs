#![no_main]

use libfuzzer_sys::fuzz_target;
use medseq::contracts::{CounterStore, ScopeKey};
use medseq::storage::FileCounterStore;
use tempfile::TempDir;

fuzz_target!(|data: &[u8]| {
    // Opening an arbitrary snapshot must either fail cleanly or yield a
    // store whose counters keep increasing
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("counters.json");
    std::fs::write(&path, data).unwrap();

    if let Ok(store) = FileCounterStore::open(&path) {
        let key = ScopeKey::from_raw("mr");
        let before = store.current(&key).unwrap();
        if let Ok(after) = store.increment(&key) {
            assert_eq!(after, before + 1);
        }
    }
});
