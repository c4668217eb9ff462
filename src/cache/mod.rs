//! deckcache cache system
//!
//! Session-scoped caches that sit between the study UI and the database:
//!
//! - **Known cards**: per-deck sets of cards the user has mastered
//! - **Pagination counts**: row counts per deck, search text and filter mode
//!
//! Both refill through loader closures supplied on each call and invalidate
//! themselves by listening to domain events on a process-wide [`EventChannel`].
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `deckcache.toml`, whose tables
//! [`crate::config::load`] maps onto the flat fields of [`CacheConfig`]:
//!
//! ```toml
//! [known_cards]
//! ttl_ms = 300000
//! max_size = 1000
//!
//! [pagination_count]
//! ttl_ms = 60000
//! max_size = 500
//! debounce_cooldown_ms = 2000
//! ```

mod config;
mod count;
mod debounce;
mod entry;
mod events;
mod keys;
mod known_cards;
mod lock;
mod publisher;
mod session;
mod store;

pub use config::CacheConfig;
pub use count::PaginationCountCache;
pub use entry::{CacheEntry, Clock, ManualClock, SystemClock};
pub use events::{
    Delivery, DomainEvent, Epoch, EventChannel, EventKind, ModificationKind, ProgressChangeKind,
    SubscriptionId,
};
pub use keys::{CardId, CountCacheKey, DeckId, FilterMode, normalize_search};
pub use known_cards::{KnownCards, KnownCardsCache};
pub use publisher::EventPublisher;
pub use session::SessionCaches;
pub use store::CacheStats;

/// Names of every metric the cache layer emits.
pub mod metric_names {
    pub use super::count::METRIC_INVALIDATION_SKIPPED;
    pub use super::events::METRIC_EVENT_PUBLISHED;
    pub use super::store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
}
