//! Benchmarks for medseq counter stores and identifier generation.
//!
//! Run with: cargo bench
//! View results in: target/criterion/report/index.html

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use medseq::contracts::{CounterStore, FormatConfig, ScopeKey, ScopeKind};
use medseq::format::format_identifier;
use medseq::generator::{GeneratorConfig, IdentifierGenerator};
use medseq::scope::ScopeResolver;
use medseq::storage::{FileCounterStore, MemoryConfigSource, MemoryCounterStore};

// =============================================================================
// Counter Store Benchmarks
// =============================================================================

fn bench_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("increment");
    let key = ScopeKey::from_raw("token:20240301:ER");

    let memory = MemoryCounterStore::new();
    group.bench_function("memory", |b| {
        b.iter(|| memory.increment(black_box(&key)).unwrap())
    });

    let dir = TempDir::new().unwrap();
    let file = FileCounterStore::open(dir.path().join("counters.json")).unwrap();
    group.bench_function("file", |b| {
        b.iter(|| file.increment(black_box(&key)).unwrap())
    });

    #[cfg(feature = "rocksdb")]
    {
        let dir = TempDir::new().unwrap();
        let rocks = medseq::storage::RocksDbCounterStore::open(dir.path()).unwrap();
        group.bench_function("rocksdb", |b| {
            b.iter(|| rocks.increment(black_box(&key)).unwrap())
        });
    }

    group.finish();
}

/// The file store rewrites every counter on each increment, so cost grows
/// with the number of scopes it holds.
fn bench_file_store_by_scope_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_increment_by_scopes");
    group.sample_size(20);

    for scopes in [1usize, 100, 1000].iter() {
        let dir = TempDir::new().unwrap();
        let store = FileCounterStore::open(dir.path().join("counters.json")).unwrap();
        for i in 0..*scopes {
            store
                .increment(&ScopeKey::from_raw(format!("token:20240301:D{}", i)))
                .unwrap();
        }
        let key = ScopeKey::from_raw("token:20240301:D0");

        group.bench_with_input(BenchmarkId::from_parameter(scopes), scopes, |b, _| {
            b.iter(|| store.increment(black_box(&key)).unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Formatting and Scope Benchmarks
// =============================================================================

fn bench_format_and_resolve(c: &mut Criterion) {
    let config = FormatConfig::default();
    c.bench_function("format_identifier", |b| {
        b.iter(|| format_identifier(black_box(&config), "MR", black_box(12_345), 2024))
    });

    let resolver = ScopeResolver::from_offset_minutes(330).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    c.bench_function("resolve_department_scope", |b| {
        b.iter(|| {
            resolver
                .resolve("token", ScopeKind::Department, black_box(now), Some("er"))
                .unwrap()
        })
    });
}

// =============================================================================
// End-to-end Generation
// =============================================================================

fn bench_next(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let generator = IdentifierGenerator::new(
        Arc::new(MemoryCounterStore::new()),
        Arc::new(MemoryConfigSource::new()),
        GeneratorConfig::default(),
    )
    .unwrap();

    c.bench_function("next_department_token", |b| {
        b.iter(|| {
            runtime
                .block_on(generator.next("token", ScopeKind::Department, Some("ER")))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_increment,
    bench_file_store_by_scope_count,
    bench_format_and_resolve,
    bench_next
);
criterion_main!(benches);
