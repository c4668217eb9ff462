//! Pagination-count cache.
//!
//! Caches row counts that drive paged card listings, keyed by deck, search text
//! and filter mode. Structural deck changes drop every count of the deck;
//! progress changes drop only the known/unknown split and are debounced per deck.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::debounce::Debouncer;
use super::entry::Clock;
use super::events::DomainEvent;
use super::keys::{CountCacheKey, DeckId, FilterMode};
use super::store::{CacheStats, TtlStore};

const CACHE_NAME: &str = "pagination_count";
pub const METRIC_INVALIDATION_SKIPPED: &str = "deckcache_invalidation_skipped_total";

/// Session-scoped cache of pagination counts.
pub struct PaginationCountCache {
    store: TtlStore<CountCacheKey, u64>,
    debouncer: Debouncer,
}

impl PaginationCountCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce_cooldown(), Arc::clone(&clock)),
            store: TtlStore::new(
                CACHE_NAME,
                config.pagination_count_ttl(),
                config.pagination_count_max_size_non_zero(),
                clock,
            ),
        }
    }

    /// Return the count for `(deck_id, search_query, filter_mode)`, calling
    /// `loader` on a miss.
    ///
    /// Without a deck id or filter mode the cache is bypassed: the loader runs
    /// directly and nothing is recorded.
    pub fn get_count<F, E>(
        &self,
        deck_id: Option<DeckId>,
        search_query: Option<&str>,
        filter_mode: Option<FilterMode>,
        loader: F,
    ) -> Result<u64, E>
    where
        F: FnOnce() -> Result<u64, E>,
    {
        let (Some(deck_id), Some(filter_mode)) = (deck_id, filter_mode) else {
            return loader();
        };

        let key = CountCacheKey::new(deck_id, search_query, filter_mode);
        if let Some(count) = self.store.lookup(&key) {
            return Ok(count);
        }

        let count = loader()?;
        self.store.insert(key, count);
        Ok(count)
    }

    /// Drop every cached count of `deck_id`, whatever the search or filter.
    pub fn invalidate(&self, deck_id: Option<DeckId>) {
        let Some(deck_id) = deck_id else {
            return;
        };
        let removed = self.store.remove_where(|key| key.deck_id() == deck_id);
        debug!(deck_id, removed, "Pagination counts invalidated");
    }

    /// Drop the known-only and unknown-only counts of `deck_id`, keeping the
    /// unfiltered totals a progress change cannot affect.
    pub fn invalidate_filtered(&self, deck_id: DeckId) {
        let removed = self.store.remove_where(|key| {
            key.deck_id() == deck_id && key.filter_mode().depends_on_progress()
        });
        debug!(deck_id, removed, "Filtered pagination counts invalidated");
    }

    pub fn clear(&self) {
        self.store.clear();
        self.debouncer.reset();
    }

    pub fn on_deck_modified(&self, event: &DomainEvent) {
        if let DomainEvent::DeckModified { deck_id, .. } = event {
            self.invalidate(Some(*deck_id));
        }
    }

    /// Debounced per deck: a repeat inside the cooldown is counted and skipped.
    pub fn on_progress_changed(&self, event: &DomainEvent) {
        let DomainEvent::ProgressChanged { deck_id, kind, .. } = event else {
            return;
        };

        if self.debouncer.try_acquire(*deck_id) {
            self.invalidate_filtered(*deck_id);
        } else {
            counter!(METRIC_INVALIDATION_SKIPPED, "cache" => CACHE_NAME).increment(1);
            debug!(deck_id, change = ?kind, "Progress invalidation debounced");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            skipped_invalidations: self.debouncer.skipped(),
            ..self.store.stats()
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::time::Duration;

    use super::*;
    use crate::cache::entry::ManualClock;
    use crate::cache::events::ModificationKind;

    fn cache_with(config: CacheConfig) -> (PaginationCountCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (PaginationCountCache::new(&config, clock.clone()), clock)
    }

    fn ok(value: u64) -> Result<u64, Infallible> {
        Ok(value)
    }

    /// Fetch through the cache and report whether the loader ran.
    fn fetch(
        cache: &PaginationCountCache,
        deck: DeckId,
        search: Option<&str>,
        filter: FilterMode,
        value: u64,
    ) -> (u64, bool) {
        let loaded = Cell::new(false);
        let count = cache
            .get_count(Some(deck), search, Some(filter), || {
                loaded.set(true);
                ok(value)
            })
            .expect("infallible");
        (count, loaded.get())
    }

    #[test]
    fn hit_and_miss_counting() {
        let (cache, _) = cache_with(CacheConfig::default());

        assert_eq!(fetch(&cache, 1, None, FilterMode::All, 100), (100, true));
        for _ in 0..3 {
            assert_eq!(fetch(&cache, 1, None, FilterMode::All, 0), (100, false));
        }

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn missing_deck_or_filter_bypasses_cache() {
        let (cache, _) = cache_with(CacheConfig::default());
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            ok(7)
        };

        for _ in 0..2 {
            assert_eq!(cache.get_count(None, None, Some(FilterMode::All), load), Ok(7));
            assert_eq!(cache.get_count(Some(1), None, None, load), Ok(7));
        }

        assert_eq!(calls.get(), 4);
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn null_and_blank_search_share_a_slot() {
        let (cache, _) = cache_with(CacheConfig::default());

        assert!(fetch(&cache, 1, None, FilterMode::All, 12).1);
        assert_eq!(fetch(&cache, 1, Some(""), FilterMode::All, 0), (12, false));
        assert_eq!(fetch(&cache, 1, Some("  "), FilterMode::All, 0), (12, false));
        assert!(fetch(&cache, 1, Some("verb"), FilterMode::All, 3).1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (cache, clock) = cache_with(CacheConfig {
            pagination_count_ttl_ms: 30_000,
            ..Default::default()
        });

        fetch(&cache, 1, None, FilterMode::All, 1);
        clock.advance(Duration::from_millis(29_999));
        assert!(!fetch(&cache, 1, None, FilterMode::All, 1).1);
        clock.advance(Duration::from_millis(1));
        assert!(fetch(&cache, 1, None, FilterMode::All, 1).1);
    }

    #[test]
    fn loader_error_propagates() {
        let (cache, _) = cache_with(CacheConfig::default());

        let result = cache.get_count(Some(1), None, Some(FilterMode::All), || {
            Err::<u64, _>("count failed")
        });
        assert_eq!(result, Err("count failed"));
        assert!(cache.is_empty());
    }

    #[test]
    fn progress_change_preserves_unfiltered_counts() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::All, 100);
        fetch(&cache, 1, None, FilterMode::KnownOnly, 30);

        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 9));

        assert_eq!(fetch(&cache, 1, None, FilterMode::All, 0), (100, false));
        assert_eq!(fetch(&cache, 1, None, FilterMode::KnownOnly, 31), (31, true));
    }

    #[test]
    fn deck_reset_also_preserves_unfiltered_counts() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, Some("noun"), FilterMode::All, 40);
        fetch(&cache, 1, Some("noun"), FilterMode::UnknownOnly, 10);

        cache.on_progress_changed(&DomainEvent::deck_reset(1));

        assert!(!fetch(&cache, 1, Some("noun"), FilterMode::All, 0).1);
        assert!(fetch(&cache, 1, Some("noun"), FilterMode::UnknownOnly, 40).1);
    }

    #[test]
    fn deck_modified_invalidates_every_filter() {
        let (cache, _) = cache_with(CacheConfig::default());
        for filter in [FilterMode::All, FilterMode::KnownOnly, FilterMode::UnknownOnly] {
            fetch(&cache, 1, None, filter, 5);
        }
        fetch(&cache, 2, None, FilterMode::All, 8);

        cache.on_deck_modified(&DomainEvent::deck_modified(1, ModificationKind::CardRemoved));

        for filter in [FilterMode::All, FilterMode::KnownOnly, FilterMode::UnknownOnly] {
            assert!(fetch(&cache, 1, None, filter, 4).1, "{filter} should miss");
        }
        assert!(!fetch(&cache, 2, None, FilterMode::All, 0).1);
    }

    #[test]
    fn rapid_progress_events_are_debounced() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::KnownOnly, 30);

        for card in 0..5 {
            cache.on_progress_changed(&DomainEvent::card_status_changed(1, card));
        }

        assert_eq!(cache.stats().skipped_invalidations, 4);

        // Only the first event invalidated; the refill survives the rest.
        fetch(&cache, 1, None, FilterMode::KnownOnly, 31);
        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 6));
        assert_eq!(fetch(&cache, 1, None, FilterMode::KnownOnly, 0), (31, false));
    }

    #[test]
    fn different_decks_do_not_share_cooldown() {
        let (cache, _) = cache_with(CacheConfig::default());

        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 1));
        cache.on_progress_changed(&DomainEvent::card_status_changed(2, 1));

        assert_eq!(cache.stats().skipped_invalidations, 0);
    }

    #[test]
    fn cooldown_elapses() {
        let (cache, clock) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::KnownOnly, 30);

        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 1));
        fetch(&cache, 1, None, FilterMode::KnownOnly, 31);

        clock.advance(Duration::from_millis(2000));
        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 2));

        assert!(fetch(&cache, 1, None, FilterMode::KnownOnly, 32).1);
        assert_eq!(cache.stats().skipped_invalidations, 0);
    }

    #[test]
    fn deck_modified_is_never_debounced() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 1));

        fetch(&cache, 1, None, FilterMode::All, 10);
        cache.on_deck_modified(&DomainEvent::deck_modified(1, ModificationKind::CardAdded));
        assert!(fetch(&cache, 1, None, FilterMode::All, 11).1);

        fetch(&cache, 1, None, FilterMode::All, 11);
        cache.on_deck_modified(&DomainEvent::deck_modified(1, ModificationKind::CardAdded));
        assert!(fetch(&cache, 1, None, FilterMode::All, 12).1);
        assert_eq!(cache.stats().skipped_invalidations, 0);
    }

    #[test]
    fn handlers_ignore_other_event_kinds() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::All, 10);
        fetch(&cache, 1, None, FilterMode::KnownOnly, 3);

        cache.on_deck_modified(&DomainEvent::deck_reset(1));
        cache.on_progress_changed(&DomainEvent::deck_modified(1, ModificationKind::DeckDeleted));

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_covers_all_search_combinations() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::All, 1);
        fetch(&cache, 1, Some("a"), FilterMode::KnownOnly, 1);
        fetch(&cache, 1, Some("b"), FilterMode::UnknownOnly, 1);
        fetch(&cache, 2, Some("a"), FilterMode::All, 1);

        cache.invalidate(None);
        assert_eq!(cache.len(), 4);
        cache.invalidate(Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_keeps_size_bounded_and_drops_oldest() {
        let (cache, clock) = cache_with(CacheConfig {
            pagination_count_max_size: 2,
            ..Default::default()
        });

        fetch(&cache, 1, None, FilterMode::All, 1);
        clock.advance(Duration::from_millis(1));
        fetch(&cache, 2, None, FilterMode::All, 2);
        clock.advance(Duration::from_millis(1));
        fetch(&cache, 3, None, FilterMode::All, 3);

        let stats = cache.stats();
        assert!(stats.size <= 2);
        assert_eq!(stats.evictions, 1);
        assert!(!fetch(&cache, 3, None, FilterMode::All, 0).1);
        assert!(!fetch(&cache, 2, None, FilterMode::All, 0).1);
        assert!(fetch(&cache, 1, None, FilterMode::All, 1).1);
    }

    #[test]
    fn clear_resets_entries_and_cooldowns() {
        let (cache, _) = cache_with(CacheConfig::default());
        fetch(&cache, 1, None, FilterMode::KnownOnly, 1);
        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 1));

        cache.clear();
        assert!(cache.is_empty());

        fetch(&cache, 1, None, FilterMode::KnownOnly, 1);
        cache.on_progress_changed(&DomainEvent::card_status_changed(1, 2));
        assert!(cache.is_empty(), "cooldown was forgotten");
    }

    #[test]
    fn skipped_invalidations_are_counted_as_metrics() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let (cache, _) = cache_with(CacheConfig::default());

        metrics::with_local_recorder(&recorder, || {
            for card in 0..3 {
                cache.on_progress_changed(&DomainEvent::card_status_changed(9, card));
            }
        });

        let skipped: u64 = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == METRIC_INVALIDATION_SKIPPED)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => count,
                other => panic!("unexpected metric value: {other:?}"),
            })
            .sum();
        assert_eq!(skipped, 2);
        assert_eq!(cache.stats().skipped_invalidations, 2);
    }
}
