//! Cache configuration.
//!
//! Controls TTLs, capacity bounds and invalidation debouncing for the
//! session-scoped caches. The serde shape is flat; the nested
//! `[known_cards]` / `[pagination_count]` tables of `deckcache.toml` are mapped
//! onto it by [`crate::config::load`].

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Default values for cache configuration
const DEFAULT_KNOWN_CARDS_TTL_MS: u64 = 300_000;
const DEFAULT_KNOWN_CARDS_MAX_SIZE: usize = 1000;
const DEFAULT_PAGINATION_COUNT_TTL_MS: u64 = 60_000;
const DEFAULT_PAGINATION_COUNT_MAX_SIZE: usize = 500;
const DEFAULT_DEBOUNCE_COOLDOWN_MS: u64 = 2000;

/// Resolved cache settings. Deserializes from flat `known_cards_*` and
/// `pagination_count_*` keys; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached known-card set.
    pub known_cards_ttl_ms: u64,
    /// Maximum decks held by the known-cards cache.
    pub known_cards_max_size: usize,
    /// Lifetime of a cached pagination count.
    pub pagination_count_ttl_ms: u64,
    /// Maximum keys held by the pagination-count cache.
    pub pagination_count_max_size: usize,
    /// Minimum gap between effective progress invalidations of one deck.
    pub pagination_count_debounce_cooldown_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            known_cards_ttl_ms: DEFAULT_KNOWN_CARDS_TTL_MS,
            known_cards_max_size: DEFAULT_KNOWN_CARDS_MAX_SIZE,
            pagination_count_ttl_ms: DEFAULT_PAGINATION_COUNT_TTL_MS,
            pagination_count_max_size: DEFAULT_PAGINATION_COUNT_MAX_SIZE,
            pagination_count_debounce_cooldown_ms: DEFAULT_DEBOUNCE_COOLDOWN_MS,
        }
    }
}

impl CacheConfig {
    pub fn known_cards_ttl(&self) -> Duration {
        Duration::from_millis(self.known_cards_ttl_ms)
    }

    pub fn pagination_count_ttl(&self) -> Duration {
        Duration::from_millis(self.pagination_count_ttl_ms)
    }

    pub fn debounce_cooldown(&self) -> Duration {
        Duration::from_millis(self.pagination_count_debounce_cooldown_ms)
    }

    /// Returns the known-cards bound as NonZeroUsize, clamping to 1 if zero.
    pub fn known_cards_max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.known_cards_max_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the pagination-count bound as NonZeroUsize, clamping to 1 if zero.
    pub fn pagination_count_max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.pagination_count_max_size).unwrap_or(NonZeroUsize::MIN)
    }
}
