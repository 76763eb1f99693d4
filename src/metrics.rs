//! Runtime-wide counters, generalized from the donor's single-API `HttpMetrics`
//! to cover every endpoint a [`RequestCore`](crate::request::RequestCore) calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomics-backed counter set. Cumulative for the lifetime of the owning
/// `Arc<RuntimeMetrics>`; cloning a `RequestCore` shares the same counters
/// unless the caller explicitly swaps in a fresh one.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    total_requests: AtomicU64,
    successful_responses: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    rate_limit_waits: AtomicU64,
    rate_limit_delay_millis: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RuntimeMetricsSnapshot {
        RuntimeMetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_responses: self.successful_responses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            rate_limit_delay_millis: self.rate_limit_delay_millis.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_total_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_successful_responses(&self) {
        self.successful_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rate_limit_waits(&self) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_rate_limit_delay(&self, millis: u64) {
        self.rate_limit_delay_millis
            .fetch_add(millis, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of [`RuntimeMetrics`] with plain `u64` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeMetricsSnapshot {
    pub total_requests: u64,
    pub successful_responses: u64,
    pub errors: u64,
    pub retries: u64,
    pub rate_limit_waits: u64,
    pub rate_limit_delay_millis: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl std::fmt::Display for RuntimeMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "requests={} success={} errors={} retries={} rate_limit_waits={} ({}ms) sent={} recv={}",
            self.total_requests,
            self.successful_responses,
            self.errors,
            self.retries,
            self.rate_limit_waits,
            self.rate_limit_delay_millis,
            format_bytes(self.bytes_sent),
            format_bytes(self.bytes_received),
        )
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
