//! Per-deck invalidation cooldown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::entry::Clock;
use super::keys::DeckId;

/// Tracks the last effective invalidation of each deck and rejects repeats
/// that arrive within the cooldown.
pub(crate) struct Debouncer {
    cooldown: Duration,
    last_effective: DashMap<DeckId, Instant>,
    skipped: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Debouncer {
    pub(crate) fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            last_effective: DashMap::new(),
            skipped: AtomicU64::new(0),
            clock,
        }
    }

    /// Returns true if an invalidation of `deck_id` should run now, and records
    /// it as the latest. Returns false (and counts a skip) inside the cooldown.
    ///
    /// Tracking a new deck first drops every deck whose cooldown has passed.
    pub(crate) fn try_acquire(&self, deck_id: DeckId) -> bool {
        let now = self.clock.now();
        if !self.last_effective.contains_key(&deck_id) {
            self.prune(now);
        }

        let acquired = match self.last_effective.entry(deck_id) {
            Entry::Occupied(mut last) => {
                if self.cooling_down(*last.get(), now) {
                    false
                } else {
                    last.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        };

        if !acquired {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        acquired
    }

    fn cooling_down(&self, last: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last) < self.cooldown
    }

    fn prune(&self, now: Instant) {
        self.last_effective.retain(|_, last| self.cooling_down(*last, now));
    }

    pub(crate) fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.last_effective.clear();
    }
}
