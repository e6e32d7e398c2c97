//! Global atomic counters for pushgate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a push).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    pushes_evaluated: AtomicU64,
    changesets_evaluated: AtomicU64,
    queries_issued: AtomicU64,
    query_cache_hits: AtomicU64,
    query_failures: AtomicU64,
    fail_opens: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pushes_evaluated: AtomicU64::new(0),
            changesets_evaluated: AtomicU64::new(0),
            queries_issued: AtomicU64::new(0),
            query_cache_hits: AtomicU64::new(0),
            query_failures: AtomicU64::new(0),
            fail_opens: AtomicU64::new(0),
        }
    }

    pub fn inc_pushes(&self) {
        self.pushes_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pushes_evaluated", "counter incremented");
    }

    pub fn inc_changesets(&self) {
        self.changesets_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "changesets_evaluated", "counter incremented");
    }

    /// An outbound oracle call was made (cache miss).
    pub fn inc_queries(&self) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "queries_issued", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.query_cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "query_cache_hits", "counter incremented");
    }

    pub fn inc_query_failures(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "query_failures", "counter incremented");
    }

    pub fn inc_fail_opens(&self) {
        self.fail_opens.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fail_opens", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pushes_evaluated = self.pushes_evaluated(),
            changesets_evaluated = self.changesets_evaluated(),
            queries_issued = self.queries_issued(),
            query_cache_hits = self.query_cache_hits(),
            query_failures = self.query_failures(),
            fail_opens = self.fail_opens(),
        );
    }

    pub fn pushes_evaluated(&self) -> u64 {
        self.pushes_evaluated.load(Ordering::Relaxed)
    }

    pub fn changesets_evaluated(&self) -> u64 {
        self.changesets_evaluated.load(Ordering::Relaxed)
    }

    pub fn queries_issued(&self) -> u64 {
        self.queries_issued.load(Ordering::Relaxed)
    }

    pub fn query_cache_hits(&self) -> u64 {
        self.query_cache_hits.load(Ordering::Relaxed)
    }

    pub fn query_failures(&self) -> u64 {
        self.query_failures.load(Ordering::Relaxed)
    }

    pub fn fail_opens(&self) -> u64 {
        self.fail_opens.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.pushes_evaluated.store(0, Ordering::Relaxed);
        self.changesets_evaluated.store(0, Ordering::Relaxed);
        self.queries_issued.store(0, Ordering::Relaxed);
        self.query_cache_hits.store(0, Ordering::Relaxed);
        self.query_failures.store(0, Ordering::Relaxed);
        self.fail_opens.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.pushes_evaluated(), 0);
        m.inc_pushes();
        m.inc_changesets();
        m.inc_changesets();
        assert_eq!(m.pushes_evaluated(), 1);
        assert_eq!(m.changesets_evaluated(), 2);

        m.inc_queries();
        m.inc_cache_hits();
        m.inc_query_failures();
        m.inc_fail_opens();
        assert_eq!(m.queries_issued(), 1);
        assert_eq!(m.query_cache_hits(), 1);
        assert_eq!(m.query_failures(), 1);
        assert_eq!(m.fail_opens(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_pushes();
        m.inc_queries();
        m.inc_fail_opens();
        m.reset();
        assert_eq!(m.pushes_evaluated(), 0);
        assert_eq!(m.queries_issued(), 0);
        assert_eq!(m.fail_opens(), 0);
    }
}
