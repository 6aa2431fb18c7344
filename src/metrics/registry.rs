//! Metrics registry for identifier generation and the HTTP layer.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::Histogram;
use crate::contracts::{GenerateError, ScopeKind};

/// Central registry for all medseq metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    pub generation: GenerationMetrics,
    pub http: HttpMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Self::default();
        let _ = registry.http.start_time.set(Instant::now());
        registry
    }

    /// Formats all metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);
        self.http.write_prometheus(&mut output);
        output.push('\n');
        self.generation.write_prometheus(&mut output);
        output
    }
}

/// Outcomes of `next` calls.
#[derive(Default)]
pub struct GenerationMetrics {
    /// Issued identifiers per (family, scope kind)
    pub issued: DashMap<(String, ScopeKind), u64>,
    /// Calls that failed before anything was issued
    pub storage_errors_total: AtomicU64,
    /// Sequences reserved but not rendered; each one is a gap to reconcile
    pub config_unavailable_total: AtomicU64,
    pub invalid_requests_total: AtomicU64,
    /// Format-only retries that succeeded
    pub renders_total: AtomicU64,
    pub config_updates_total: AtomicU64,
    pub next_latency: Histogram,
}

impl GenerationMetrics {
    pub fn record_issued(&self, family: &str, kind: ScopeKind, elapsed: Duration) {
        *self.issued.entry((family.to_string(), kind)).or_insert(0) += 1;
        self.next_latency.observe(elapsed);
    }

    /// Classifies a failed generation call.
    pub fn record_error(&self, error: &GenerateError) {
        let counter = match error {
            GenerateError::StorageUnavailable(_) => &self.storage_errors_total,
            GenerateError::ConfigUnavailable { .. } => &self.config_unavailable_total,
            GenerateError::InvalidRequest(_)
            | GenerateError::UnknownFamily(_)
            | GenerateError::InvalidConfig(_) => &self.invalid_requests_total,
            GenerateError::ConfigSourceUnavailable(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render(&self) {
        self.renders_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_update(&self) {
        self.config_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issued_total(&self) -> u64 {
        self.issued.iter().map(|entry| *entry.value()).sum()
    }

    pub fn issued_for(&self, family: &str, kind: ScopeKind) -> u64 {
        self.issued
            .get(&(family.to_string(), kind))
            .map(|v| *v)
            .unwrap_or(0)
    }

    fn write_prometheus(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# HELP medseq_identifiers_issued_total Identifiers issued"
        );
        let _ = writeln!(output, "# TYPE medseq_identifiers_issued_total counter");
        let mut issued: Vec<_> = self
            .issued
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        issued.sort_by(|(a, _), (b, _)| a.0.cmp(&b.0).then(a.1.as_str().cmp(b.1.as_str())));
        for ((family, kind), count) in issued {
            let _ = writeln!(
                output,
                "medseq_identifiers_issued_total{{family=\"{}\",kind=\"{}\"}} {}",
                family, kind, count
            );
        }
        output.push('\n');

        write_counter(
            output,
            "medseq_storage_errors_total",
            "Generation calls failed by the counter store",
            &self.storage_errors_total,
        );
        write_counter(
            output,
            "medseq_config_unavailable_total",
            "Sequences reserved but not rendered",
            &self.config_unavailable_total,
        );
        write_counter(
            output,
            "medseq_invalid_requests_total",
            "Rejected generation requests",
            &self.invalid_requests_total,
        );
        write_counter(
            output,
            "medseq_renders_total",
            "Format-only retries of reserved sequences",
            &self.renders_total,
        );
        write_counter(
            output,
            "medseq_config_updates_total",
            "Accepted format configuration updates",
            &self.config_updates_total,
        );

        self.next_latency.write_prometheus(
            output,
            "medseq_next_latency_us",
            "Latency of successful next calls in microseconds",
        );
    }
}

/// Request counters for the HTTP API.
#[derive(Default)]
pub struct HttpMetrics {
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub start_time: OnceLock<Instant>,
}

impl HttpMetrics {
    #[inline]
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn write_prometheus(&self, output: &mut String) {
        let _ = writeln!(output, "# HELP medseq_uptime_secs Server uptime in seconds");
        let _ = writeln!(output, "# TYPE medseq_uptime_secs gauge");
        let _ = writeln!(output, "medseq_uptime_secs {:.3}", self.uptime_secs());
        output.push('\n');

        write_counter(
            output,
            "medseq_http_requests_total",
            "HTTP requests handled",
            &self.requests_total,
        );
        write_counter(
            output,
            "medseq_http_errors_total",
            "HTTP requests answered with an error",
            &self.errors_total,
        );
    }
}

fn write_counter(output: &mut String, name: &str, help: &str, value: &AtomicU64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} counter", name);
    let _ = writeln!(output, "{} {}", name, value.load(Ordering::Relaxed));
    output.push('\n');
}
