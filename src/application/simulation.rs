//! Deterministic practice-session replay.
//!
//! Drives one [`SessionCaches`] the way the study screen does: every step shows
//! a page of a deck (known cards plus a pagination count), flips one card and
//! publishes the resulting events. Loads go to an in-memory [`MemoryStore`]
//! that counts how often the caches had to reach it.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{
    CacheConfig, CacheStats, CardId, DeckId, EventChannel, EventPublisher, FilterMode,
    ManualClock, ModificationKind, SessionCaches, normalize_search,
};
use crate::config::SimulateArgs;

const FILTERS: [FilterMode; 3] = [
    FilterMode::All,
    FilterMode::KnownOnly,
    FilterMode::UnknownOnly,
];
const SEARCHES: [Option<&str>; 4] = [None, Some("card 1"), Some("   "), Some(" card 2 ")];
const FLIPS_PER_DECK_VISIT: u32 = 4;
const CARD_ADDED_EVERY: u32 = 25;
const DECK_RESET_EVERY: u32 = 90;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("deck {0} does not exist")]
    UnknownDeck(DeckId),
    #[error("deck {0} has no cards")]
    EmptyDeck(DeckId),
}

/// Number of round trips the caches made to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounters {
    pub known_cards: u64,
    pub known_cards_batch: u64,
    pub counts: u64,
}

#[derive(Debug, Clone)]
struct Card {
    id: CardId,
    front: String,
    known: bool,
}

/// Card library held in memory, standing in for the study database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    decks: BTreeMap<DeckId, Vec<Card>>,
    next_card_id: CardId,
    loads: Cell<LoadCounters>,
}

impl MemoryStore {
    /// Build `decks` decks of `cards` cards each; every fifth card starts known.
    pub fn seeded(decks: u32, cards: u32) -> Self {
        let mut store = Self {
            next_card_id: 1,
            ..Self::default()
        };
        for deck_id in 1..=DeckId::from(decks) {
            store.decks.insert(deck_id, Vec::new());
            for position in 0..cards {
                let id = store.push_card(deck_id);
                if position % 5 == 0
                    && let Some(card) = store.card_mut(deck_id, id)
                {
                    card.known = true;
                }
            }
        }
        store
    }

    pub fn deck_ids(&self) -> impl Iterator<Item = DeckId> + '_ {
        self.decks.keys().copied()
    }

    pub fn loads(&self) -> LoadCounters {
        self.loads.get()
    }

    pub fn load_known_cards(&self, deck_id: DeckId) -> Result<HashSet<CardId>, StoreError> {
        self.record(|loads| loads.known_cards += 1);
        self.known_set(deck_id)
    }

    /// Single round trip for many decks. Decks that do not exist are omitted.
    pub fn load_known_cards_for(
        &self,
        deck_ids: &HashSet<DeckId>,
    ) -> Result<HashMap<DeckId, HashSet<CardId>>, StoreError> {
        self.record(|loads| loads.known_cards_batch += 1);
        Ok(deck_ids
            .iter()
            .filter_map(|deck_id| Some((*deck_id, self.known_set(*deck_id).ok()?)))
            .collect())
    }

    pub fn count_cards(
        &self,
        deck_id: DeckId,
        search_query: Option<&str>,
        filter_mode: FilterMode,
    ) -> Result<u64, StoreError> {
        self.record(|loads| loads.counts += 1);
        self.matching(deck_id, search_query, filter_mode)
    }

    /// Toggle the known flag of the card at `position` (wrapping) and return its id.
    pub fn flip(&mut self, deck_id: DeckId, position: usize) -> Result<CardId, StoreError> {
        let cards = self
            .decks
            .get_mut(&deck_id)
            .ok_or(StoreError::UnknownDeck(deck_id))?;
        if cards.is_empty() {
            return Err(StoreError::EmptyDeck(deck_id));
        }
        let len = cards.len();
        let card = &mut cards[position % len];
        card.known = !card.known;
        Ok(card.id)
    }

    pub fn add_card(&mut self, deck_id: DeckId) -> Result<CardId, StoreError> {
        if !self.decks.contains_key(&deck_id) {
            return Err(StoreError::UnknownDeck(deck_id));
        }
        Ok(self.push_card(deck_id))
    }

    pub fn reset_deck(&mut self, deck_id: DeckId) -> Result<(), StoreError> {
        let cards = self
            .decks
            .get_mut(&deck_id)
            .ok_or(StoreError::UnknownDeck(deck_id))?;
        cards.iter_mut().for_each(|card| card.known = false);
        Ok(())
    }

    fn push_card(&mut self, deck_id: DeckId) -> CardId {
        let id = self.next_card_id;
        self.next_card_id += 1;
        self.decks.entry(deck_id).or_default().push(Card {
            id,
            front: format!("card {id}"),
            known: false,
        });
        id
    }

    fn card_mut(&mut self, deck_id: DeckId, card_id: CardId) -> Option<&mut Card> {
        self.decks
            .get_mut(&deck_id)?
            .iter_mut()
            .find(|card| card.id == card_id)
    }

    fn known_set(&self, deck_id: DeckId) -> Result<HashSet<CardId>, StoreError> {
        let cards = self
            .decks
            .get(&deck_id)
            .ok_or(StoreError::UnknownDeck(deck_id))?;
        Ok(cards.iter().filter(|c| c.known).map(|c| c.id).collect())
    }

    fn matching(
        &self,
        deck_id: DeckId,
        search_query: Option<&str>,
        filter_mode: FilterMode,
    ) -> Result<u64, StoreError> {
        let cards = self
            .decks
            .get(&deck_id)
            .ok_or(StoreError::UnknownDeck(deck_id))?;
        let needle = normalize_search(search_query);
        let count = cards
            .iter()
            .filter(|card| needle.is_empty() || card.front.contains(needle.as_str()))
            .filter(|card| match filter_mode {
                FilterMode::All => true,
                FilterMode::KnownOnly => card.known,
                FilterMode::UnknownOnly => !card.known,
            })
            .count();
        Ok(count as u64)
    }

    fn record(&self, update: impl FnOnce(&mut LoadCounters)) {
        let mut loads = self.loads.get();
        update(&mut loads);
        self.loads.set(loads);
    }
}

/// Shape of a simulated practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationPlan {
    pub decks: u32,
    pub cards_per_deck: u32,
    pub flips: u32,
    pub think_time: Duration,
}

impl From<&SimulateArgs> for SimulationPlan {
    fn from(args: &SimulateArgs) -> Self {
        Self {
            decks: args.decks,
            cards_per_deck: args.cards,
            flips: args.flips,
            think_time: Duration::from_millis(args.think_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub session_id: Uuid,
    pub flips: u32,
    pub page_views: u64,
    pub events_published: u64,
    pub loads: LoadCounters,
    /// Pages whose known-card set disagreed with the store.
    pub stale_known_card_reads: u64,
    /// Pages whose count disagreed with the store, caused by debounced invalidations.
    pub stale_count_reads: u64,
    pub known_cards: CacheStats,
    pub pagination_count: CacheStats,
}

#[derive(Debug, Default)]
struct Tally {
    page_views: u64,
    events_published: u64,
    stale_known_card_reads: u64,
    stale_count_reads: u64,
}

/// Replay `plan` against a fresh store and session, on a manual clock.
pub fn run(config: &CacheConfig, plan: SimulationPlan) -> Result<SimulationReport, StoreError> {
    let clock = Arc::new(ManualClock::new());
    let channel = Arc::new(EventChannel::new());
    let publisher = EventPublisher::new(Arc::clone(&channel));
    let session = SessionCaches::open_with_clock(config, Arc::clone(&channel), clock.clone());
    let mut store = MemoryStore::seeded(plan.decks, plan.cards_per_deck);
    let mut tally = Tally::default();

    info!(
        session_id = %session.session_id(),
        decks = plan.decks,
        cards = plan.cards_per_deck,
        flips = plan.flips,
        "Starting practice simulation"
    );

    let deck_ids: HashSet<DeckId> = store.deck_ids().collect();
    session
        .known_cards()
        .get_known_cards_batch(&deck_ids, || store.load_known_cards_for(&deck_ids))?;

    for step in 0..plan.flips {
        let deck_id = deck_for_step(step, plan.decks);
        show_page(&session, &store, deck_id, step, &mut tally)?;

        let card_id = store.flip(deck_id, step as usize * 7)?;
        tally.record(publisher.card_status_changed(deck_id, card_id).is_some());

        if step % CARD_ADDED_EVERY == CARD_ADDED_EVERY - 1 {
            store.add_card(deck_id)?;
            tally.record(
                publisher
                    .deck_modified(deck_id, ModificationKind::CardAdded)
                    .is_some(),
            );
        }
        if step % DECK_RESET_EVERY == DECK_RESET_EVERY - 1 {
            store.reset_deck(deck_id)?;
            tally.record(publisher.deck_reset(deck_id).is_some());
        }

        clock.advance(plan.think_time);
    }

    let report = SimulationReport {
        session_id: session.session_id(),
        flips: plan.flips,
        page_views: tally.page_views,
        events_published: tally.events_published,
        loads: store.loads(),
        stale_known_card_reads: tally.stale_known_card_reads,
        stale_count_reads: tally.stale_count_reads,
        known_cards: session.known_cards().stats(),
        pagination_count: session.counts().stats(),
    };
    session.close();

    info!(
        loads = ?report.loads,
        known_cards_hit_rate = report.known_cards.hit_rate(),
        pagination_count_hit_rate = report.pagination_count.hit_rate(),
        "Practice simulation finished"
    );
    Ok(report)
}

fn deck_for_step(step: u32, decks: u32) -> DeckId {
    DeckId::from((step / FLIPS_PER_DECK_VISIT) % decks.max(1)) + 1
}

fn show_page(
    session: &SessionCaches,
    store: &MemoryStore,
    deck_id: DeckId,
    step: u32,
    tally: &mut Tally,
) -> Result<(), StoreError> {
    tally.page_views += 1;

    let known = session
        .known_cards()
        .get_known_cards(Some(deck_id), || store.load_known_cards(deck_id))?;
    if *known != store.known_set(deck_id)? {
        tally.stale_known_card_reads += 1;
    }

    let filter_mode = FILTERS[step as usize % FILTERS.len()];
    let search_query = SEARCHES[step as usize % SEARCHES.len()];
    let count = session.counts().get_count(
        Some(deck_id),
        search_query,
        Some(filter_mode),
        || store.count_cards(deck_id, search_query, filter_mode),
    )?;
    if count != store.matching(deck_id, search_query, filter_mode)? {
        debug!(deck_id, %filter_mode, count, "Stale pagination count served");
        tally.stale_count_reads += 1;
    }
    Ok(())
}

impl Tally {
    fn record(&mut self, published: bool) {
        if published {
            self.events_published += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(flips: u32) -> SimulationPlan {
        SimulationPlan {
            decks: 3,
            cards_per_deck: 40,
            flips,
            think_time: Duration::from_millis(500),
        }
    }

    #[test]
    fn seeded_store_marks_every_fifth_card_known() {
        let store = MemoryStore::seeded(2, 10);
        assert_eq!(store.deck_ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.load_known_cards(1).expect("deck exists").len(), 2);
        assert_eq!(store.loads().known_cards, 1);
    }

    #[test]
    fn counting_normalizes_search_text() {
        let store = MemoryStore::seeded(1, 12);
        let blank = store
            .count_cards(1, Some("   "), FilterMode::All)
            .expect("deck exists");
        let unfiltered = store
            .count_cards(1, None, FilterMode::All)
            .expect("deck exists");
        assert_eq!(blank, 12);
        assert_eq!(blank, unfiltered);
        // card 1, card 10, card 11, card 12
        assert_eq!(
            store
                .count_cards(1, Some(" card 1 "), FilterMode::All)
                .expect("deck exists"),
            4
        );
        assert_eq!(store.loads().counts, 3);
    }

    #[test]
    fn batch_load_omits_unknown_decks() {
        let store = MemoryStore::seeded(2, 5);
        let decks: HashSet<DeckId> = [1, 2, 42].into_iter().collect();
        let loaded = store.load_known_cards_for(&decks).expect("batch load");

        assert_eq!(loaded.len(), 2);
        assert!(!loaded.contains_key(&42));
        assert_eq!(store.loads().known_cards_batch, 1);
    }

    #[test]
    fn mutations_reject_unknown_decks() {
        let mut store = MemoryStore::seeded(1, 3);
        assert_eq!(store.flip(9, 0), Err(StoreError::UnknownDeck(9)));
        assert_eq!(store.add_card(9), Err(StoreError::UnknownDeck(9)));
        assert_eq!(store.reset_deck(9), Err(StoreError::UnknownDeck(9)));
        assert_eq!(store.load_known_cards(9), Err(StoreError::UnknownDeck(9)));
    }

    #[test]
    fn flip_and_reset_change_known_set() {
        let mut store = MemoryStore::seeded(1, 3);
        let card = store.flip(1, 1).expect("deck exists");
        assert!(store.known_set(1).expect("deck exists").contains(&card));

        store.reset_deck(1).expect("deck exists");
        assert!(store.known_set(1).expect("deck exists").is_empty());
    }

    #[test]
    fn known_cards_are_never_stale() {
        let report = run(&CacheConfig::default(), plan(200)).expect("simulation runs");

        assert_eq!(report.page_views, 200);
        assert_eq!(report.stale_known_card_reads, 0);
        assert_eq!(report.loads.known_cards_batch, 1);
        assert!(report.loads.counts < report.page_views);
        assert!(report.events_published >= 200);
        assert!(report.pagination_count.skipped_invalidations > 0);
    }

    #[test]
    fn counts_are_exact_without_debounce() {
        let config = CacheConfig {
            pagination_count_debounce_cooldown_ms: 0,
            ..Default::default()
        };
        let report = run(&config, plan(200)).expect("simulation runs");

        assert_eq!(report.stale_count_reads, 0);
        assert_eq!(report.pagination_count.skipped_invalidations, 0);
    }

    #[test]
    fn report_serializes_as_json() {
        let report = run(&CacheConfig::default(), plan(10)).expect("simulation runs");
        let json = serde_json::to_value(&report).expect("serializable");

        assert_eq!(json["flips"], 10);
        assert!(json["loads"]["counts"].is_u64());
        assert!(json["known_cards"]["hits"].is_u64());
    }
}
