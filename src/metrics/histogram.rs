//! Lock-free latency histogram with Prometheus output.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bucket bounds in microseconds.
/// Spans an in-memory increment (tens of μs) up to a synced disk write
/// retried under load (hundreds of ms).
pub const LATENCY_BUCKETS_US: [u64; 10] = [
    25, 100, 250, 1_000, 2_500, 10_000, 25_000, 100_000, 250_000, 1_000_000,
];

/// Point-in-time copy of a histogram. `buckets` are cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub sum_us: u64,
    pub count: u64,
    pub buckets: [u64; LATENCY_BUCKETS_US.len()],
}

/// Thread-safe histogram of call latencies.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use medseq::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(Duration::from_micros(150));
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.count, 1);
/// assert_eq!(snapshot.sum_us, 150);
/// ```
pub struct Histogram {
    sum_us: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS_US.len()],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Records one call. Relaxed ordering: metrics don't synchronize anything.
    #[inline]
    pub fn observe(&self, elapsed: Duration) {
        let value_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.sum_us.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (bucket, &bound) in self.buckets.iter().zip(LATENCY_BUCKETS_US.iter()) {
            if value_us <= bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            sum_us: self.sum_us.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean latency in microseconds, 0 when empty.
    pub fn mean_us(&self) -> f64 {
        let snapshot = self.snapshot();
        if snapshot.count == 0 {
            0.0
        } else {
            snapshot.sum_us as f64 / snapshot.count as f64
        }
    }

    /// Appends the histogram in Prometheus exposition format to `output`.
    pub fn write_prometheus(&self, output: &mut String, name: &str, help: &str) {
        let snapshot = self.snapshot();

        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (bound, cumulative) in LATENCY_BUCKETS_US.iter().zip(snapshot.buckets.iter()) {
            let _ = writeln!(output, "{}_bucket{{le=\"{}\"}} {}", name, bound, cumulative);
        }
        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, snapshot.count);
        let _ = writeln!(output, "{}_sum {}", name, snapshot.sum_us);
        let _ = writeln!(output, "{}_count {}", name, snapshot.count);
    }
}
