use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline instance. Shared across the producer call
/// sites, the drain worker, and the recorder via `Arc`. Handler failures
/// are counted at the dispatch queue that runs the handler, not here; the
/// runtime merges them into the snapshot it hands out.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    ensembles_received: AtomicU64,
    ensembles_dropped: AtomicU64,
    long_term_emitted: AtomicU64,
    short_term_emitted: AtomicU64,
    bytes_recorded: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ensembles_received: u64,
    pub ensembles_dropped: u64,
    pub long_term_emitted: u64,
    pub short_term_emitted: u64,
    /// Drain-handler runs that returned an error. Sourced from
    /// `Dispatcher::handler_errors`.
    pub handler_errors: u64,
    pub bytes_recorded: u64,
    pub write_errors: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.ensembles_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.ensembles_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_long_term_emitted(&self) {
        self.long_term_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_term_emitted(&self) {
        self.short_term_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_recorded(&self, bytes: u64) {
        self.bytes_recorded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ensembles_dropped(&self) -> u64 {
        self.ensembles_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ensembles_received: self.ensembles_received.load(Ordering::Relaxed),
            ensembles_dropped: self.ensembles_dropped.load(Ordering::Relaxed),
            long_term_emitted: self.long_term_emitted.load(Ordering::Relaxed),
            short_term_emitted: self.short_term_emitted.load(Ordering::Relaxed),
            handler_errors: 0,
            bytes_recorded: self.bytes_recorded.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}
