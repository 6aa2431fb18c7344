//! Observability metrics for medseq.
//!
//! Counters are lock-free atomics; per-family breakdowns live in concurrent
//! maps. Everything renders in Prometheus text format for `/metrics`.

pub mod histogram;
pub mod registry;

pub use histogram::{Histogram, HistogramSnapshot, LATENCY_BUCKETS_US};
pub use registry::{GenerationMetrics, HttpMetrics, MetricsRegistry};
