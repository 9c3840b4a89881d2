//! Metrics instrumentation for dns-fuzz.
//!
//! All metrics are prefixed with `dns_fuzz.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record candidates drawn from a pattern's expansion.
pub fn record_candidates(count: u64) {
    counter!("dns_fuzz.candidates.count").increment(count);
}

/// Record one resolver round.
pub fn record_batch(result: BatchResult, names: usize, duration: Duration) {
    counter!("dns_fuzz.batch.count", "result" => result.as_str()).increment(1);
    histogram!("dns_fuzz.batch.size").record(names as f64);
    if result != BatchResult::Skipped {
        histogram!("dns_fuzz.resolver.duration.seconds", "result" => result.as_str())
            .record(duration.as_secs_f64());
    }
}

/// Outcome of a resolver round, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResult {
    /// Resolver exited cleanly.
    Resolved,
    /// Resolver exited with a partial-failure code.
    Partial,
    /// Resolver failed; candidates unresolved.
    Failed,
    /// Resolver was killed after the timeout.
    TimedOut,
    /// Resolution disabled.
    Skipped,
}

impl BatchResult {
    /// Metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            BatchResult::Resolved => "resolved",
            BatchResult::Partial => "partial",
            BatchResult::Failed => "failed",
            BatchResult::TimedOut => "timed_out",
            BatchResult::Skipped => "skipped",
        }
    }
}

/// Record newly confirmed positive names.
pub fn record_new_positives(count: usize) {
    counter!("dns_fuzz.positives.new.count").increment(count as u64);
}

/// Record the ledger size.
pub fn record_ledger_size(size: usize) {
    gauge!("dns_fuzz.ledger.size").set(size as f64);
}

/// Record a finished pattern by status label.
pub fn record_pattern(status: &'static str) {
    counter!("dns_fuzz.pattern.count", "status" => status).increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
