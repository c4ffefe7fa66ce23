//! Global atomic counters for push runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does so at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    push_attempts: AtomicU64,
    updates_run: AtomicU64,
    rejections: AtomicU64,
    errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            push_attempts: AtomicU64::new(0),
            updates_run: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn inc_attempts(&self) {
        self.push_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "push_attempts", "counter incremented");
    }

    pub fn inc_updates(&self) {
        self.updates_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "updates_run", "counter incremented");
    }

    /// Add rejected repositories of one attempt.
    pub fn add_rejections(&self, n: u64) {
        if n > 0 {
            self.rejections.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Add failed repositories of one attempt.
    pub fn add_errors(&self, n: u64) {
        if n > 0 {
            self.errors.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            push_attempts = self.push_attempts(),
            updates_run = self.updates_run(),
            rejections = self.rejections(),
            errors = self.errors(),
        );
    }

    pub fn push_attempts(&self) -> u64 {
        self.push_attempts.load(Ordering::Relaxed)
    }

    pub fn updates_run(&self) -> u64 {
        self.updates_run.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.push_attempts.store(0, Ordering::Relaxed);
        self.updates_run.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}
