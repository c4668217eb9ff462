//! Known-cards cache.
//!
//! Maps a deck to the set of cards the session's user has mastered in it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::config::CacheConfig;
use super::entry::Clock;
use super::events::DomainEvent;
use super::keys::{CardId, DeckId};
use super::store::{CacheStats, TtlStore};

const CACHE_NAME: &str = "known_cards";

/// Immutable shared view of a deck's known cards.
pub type KnownCards = Arc<HashSet<CardId>>;

/// Session-scoped cache of known-card sets, keyed by deck.
pub struct KnownCardsCache {
    store: TtlStore<DeckId, KnownCards>,
}

impl KnownCardsCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: TtlStore::new(
                CACHE_NAME,
                config.known_cards_ttl(),
                config.known_cards_max_size_non_zero(),
                clock,
            ),
        }
    }

    /// Return the known cards of `deck_id`, calling `loader` on a miss.
    ///
    /// A missing deck id yields an empty set without touching the loader or the
    /// statistics. Loader errors are returned unchanged and nothing is stored.
    pub fn get_known_cards<F, E>(&self, deck_id: Option<DeckId>, loader: F) -> Result<KnownCards, E>
    where
        F: FnOnce() -> Result<HashSet<CardId>, E>,
    {
        let Some(deck_id) = deck_id else {
            return Ok(KnownCards::default());
        };

        if let Some(cards) = self.store.lookup(&deck_id) {
            return Ok(cards);
        }

        let cards: KnownCards = Arc::new(loader()?);
        self.store.insert(deck_id, Arc::clone(&cards));
        Ok(cards)
    }

    /// Return the known cards of every deck in `deck_ids`.
    ///
    /// `batch_loader` runs at most once, and only if at least one deck is missing
    /// or stale. Decks the loader leaves out are cached as having no known cards;
    /// entries for decks that were not requested are ignored.
    pub fn get_known_cards_batch<F, E>(
        &self,
        deck_ids: &HashSet<DeckId>,
        batch_loader: F,
    ) -> Result<HashMap<DeckId, KnownCards>, E>
    where
        F: FnOnce() -> Result<HashMap<DeckId, HashSet<CardId>>, E>,
    {
        let mut result = HashMap::with_capacity(deck_ids.len());
        let mut missing = Vec::new();

        for &deck_id in deck_ids {
            match self.store.lookup(&deck_id) {
                Some(cards) => {
                    result.insert(deck_id, cards);
                }
                None => missing.push(deck_id),
            }
        }

        if missing.is_empty() {
            return Ok(result);
        }

        debug!(
            requested = deck_ids.len(),
            missing = missing.len(),
            "Loading known cards for missing decks"
        );
        let mut loaded = batch_loader()?;
        for deck_id in missing {
            let cards: KnownCards = Arc::new(loaded.remove(&deck_id).unwrap_or_default());
            self.store.insert(deck_id, Arc::clone(&cards));
            result.insert(deck_id, cards);
        }

        Ok(result)
    }

    pub fn invalidate(&self, deck_id: Option<DeckId>) {
        if let Some(deck_id) = deck_id
            && self.store.remove(&deck_id)
        {
            debug!(deck_id, "Known cards invalidated");
        }
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Drops the deck's entry on any progress change; other events are ignored.
    pub fn on_progress_changed(&self, event: &DomainEvent) {
        if let DomainEvent::ProgressChanged { deck_id, .. } = event {
            self.invalidate(Some(*deck_id));
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
