//! Global atomic counters for hdleval observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    attempts: AtomicU64,
    generator_calls: AtomicU64,
    generator_failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    entropy_skips: AtomicU64,
    timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            generator_calls: AtomicU64::new(0),
            generator_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            entropy_skips: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts", "counter incremented");
    }

    pub fn inc_generator_calls(&self) {
        self.generator_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generator_calls", "counter incremented");
    }

    pub fn inc_generator_failures(&self) {
        self.generator_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generator_failures", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    pub fn inc_entropy_skips(&self) {
        self.entropy_skips.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "entropy_skips", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a batch, CLI exit)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            attempts = self.attempts(),
            generator_calls = self.generator_calls(),
            generator_failures = self.generator_failures(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            entropy_skips = self.entropy_skips(),
            timeouts = self.timeouts(),
        );
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn generator_calls(&self) -> u64 {
        self.generator_calls.load(Ordering::Relaxed)
    }

    pub fn generator_failures(&self) -> u64 {
        self.generator_failures.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn entropy_skips(&self) -> u64 {
        self.entropy_skips.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.generator_calls,
            &self.generator_failures,
            &self.cache_hits,
            &self.cache_misses,
            &self.entropy_skips,
            &self.timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
