use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use lru::LruCache;
use serde::Serialize;
use tracing::debug;
use waypoint_core::domain::intent::IntentDecision;
use waypoint_core::domain::query::QueryFingerprint;
use waypoint_core::domain::response::{CacheEntry, HandlerResponse};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Bounded fingerprint → response memo with least-recently-used eviction.
/// A lookup counts as a use.
pub struct ResponseCache {
    entries: Mutex<LruCache<QueryFingerprint, CacheEntry>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<HandlerResponse> {
        self.get_entry(fingerprint).map(|entry| entry.response)
    }

    pub fn get_entry(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        let entry = self.lock().get(fingerprint).cloned();
        match entry {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a successful response. Error responses are refused so a
    /// transient outage is never replayed.
    pub fn put(
        &self,
        fingerprint: QueryFingerprint,
        response: HandlerResponse,
        intent: IntentDecision,
    ) -> bool {
        if !response.is_success() {
            return false;
        }
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            response,
            intent,
            created_at: Utc::now(),
        };
        let evicted = self.lock().push(fingerprint.clone(), entry);
        if let Some((evicted_key, _)) = evicted.filter(|(key, _)| *key != fingerprint) {
            debug!(
                event_name = "cache.entry.evicted",
                fingerprint = %evicted_key.short(),
                "least recently used entry evicted"
            );
        }
        true
    }

    pub fn invalidate(&self, fingerprint: &QueryFingerprint) -> bool {
        self.lock().pop(fingerprint).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn contains(&self, fingerprint: &QueryFingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    /// Most recently used first. Does not touch recency.
    pub fn fingerprints(&self) -> Vec<QueryFingerprint> {
        self.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<QueryFingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use waypoint_core::domain::intent::{ConfidenceBand, HandlerId, IntentDecision};
    use waypoint_core::domain::query::QueryFingerprint;
    use waypoint_core::domain::response::{DataSource, HandlerResponse};
    use waypoint_core::errors::ErrorKind;

    use super::ResponseCache;

    fn decision() -> IntentDecision {
        IntentDecision {
            selected_handler: HandlerId::CostAnalysis,
            confidence: ConfidenceBand::High,
            score: 1.0,
            reasoning: "matched".into(),
            fallback_applied: false,
            matched_capability: Some("cost analysis".into()),
            candidates: Vec::new(),
        }
    }

    fn answer(text: &str) -> HandlerResponse {
        HandlerResponse::success(
            HandlerId::CostAnalysis,
            text,
            DataSource::Live,
            ConfidenceBand::High,
        )
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ResponseCache::new(2);
        let a = QueryFingerprint::of("a");
        let b = QueryFingerprint::of("b");
        let c = QueryFingerprint::of("c");

        cache.put(a.clone(), answer("a"), decision());
        cache.put(b.clone(), answer("b"), decision());
        assert!(cache.get(&a).is_some());
        cache.put(c.clone(), answer("c"), decision());

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.fingerprints(), vec![c, a]);
    }

    #[test]
    fn refuses_error_responses() {
        let cache = ResponseCache::new(4);
        let stored = cache.put(
            QueryFingerprint::of("x"),
            HandlerResponse::failure(HandlerId::CostAnalysis, ErrorKind::ToolTimeout, "slow"),
            decision(),
        );
        assert!(!stored);
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_keeps_the_routing_decision() {
        let cache = ResponseCache::new(4);
        let key = QueryFingerprint::of("monthly cost");
        cache.put(key.clone(), answer("$15"), decision());

        let entry = cache.get_entry(&key).expect("cached");
        assert_eq!(entry.intent.selected_handler, HandlerId::CostAnalysis);
        assert_eq!(entry.fingerprint, key);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ResponseCache::new(4);
        let key = QueryFingerprint::of("q");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), answer("a"), decision());
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries, stats.capacity), (1, 1, 1, 4));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let cache = ResponseCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(QueryFingerprint::of("a"), answer("a"), decision());
        cache.put(QueryFingerprint::of("b"), answer("b"), decision());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_and_clear_remove_entries() {
        let cache = ResponseCache::new(4);
        let key = QueryFingerprint::of("a");
        cache.put(key.clone(), answer("a"), decision());
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        cache.put(key, answer("a"), decision());
        cache.clear();
        assert!(cache.is_empty());
    }
}
