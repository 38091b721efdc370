//! Short-lived webhook deduplication cache.
//!
//! The provider delivers webhooks at-least-once, and an instance can
//! receive the same `(correlation_id, status)` pair twice within
//! seconds. This cache lets the reconciler acknowledge the duplicate
//! without re-running side effects. It is per-process and best-effort:
//! the durable idempotency guarantee is the status-guarded update in
//! the generation repository, not this map.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window within which a repeated delivery is a duplicate.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Time-bounded map of recently processed webhook deliveries.
///
/// Keys are `(correlation_id, status)` so distinct status transitions
/// for the same job are not conflated. Expired entries are purged
/// opportunistically on each call; there is no background sweep.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    seen: HashMap<(String, String), Instant>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Whether a delivery should be processed, using the current time.
    pub fn should_process(&mut self, correlation_id: &str, status: &str) -> bool {
        self.should_process_at(correlation_id, status, Instant::now())
    }

    /// Whether a delivery should be processed, with an explicit clock.
    ///
    /// Returns `false` when the same key was seen within the window.
    /// Marks the key as seen when it returns `true`.
    pub fn should_process_at(&mut self, correlation_id: &str, status: &str, now: Instant) -> bool {
        self.purge(now);

        let key = (correlation_id.to_string(), status.to_string());
        if let Some(last) = self.seen.get(&key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.seen.insert(key, now);
        true
    }

    /// Number of live entries (after purging against `now`).
    pub fn len_at(&mut self, now: Instant) -> usize {
        self.purge(now);
        self.seen.len()
    }

    fn purge(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, seen_at| now.duration_since(*seen_at) < window);
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delivery_processes() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        assert!(cache.should_process_at("req-1", "OK", now));
    }

    #[test]
    fn repeat_within_window_is_duplicate() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        assert!(cache.should_process_at("req-1", "OK", now));
        assert!(!cache.should_process_at("req-1", "OK", now + Duration::from_secs(30)));
    }

    #[test]
    fn repeat_after_window_processes_again() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        assert!(cache.should_process_at("req-1", "OK", now));
        assert!(cache.should_process_at("req-1", "OK", now + Duration::from_secs(61)));
    }

    #[test]
    fn distinct_statuses_are_independent() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        assert!(cache.should_process_at("req-1", "IN_PROGRESS", now));
        assert!(cache.should_process_at("req-1", "OK", now));
    }

    #[test]
    fn distinct_correlation_ids_are_independent() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        assert!(cache.should_process_at("req-1", "OK", now));
        assert!(cache.should_process_at("req-2", "OK", now));
    }

    #[test]
    fn expired_entries_are_purged() {
        let mut cache = DedupCache::default();
        let now = Instant::now();
        cache.should_process_at("req-1", "OK", now);
        cache.should_process_at("req-2", "OK", now);
        assert_eq!(cache.len_at(now), 2);
        assert_eq!(cache.len_at(now + Duration::from_secs(61)), 0);
    }
}
