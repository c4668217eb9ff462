//! Per-session cache context.
//!
//! One [`SessionCaches`] is opened when a user session starts and closed when it
//! ends. Opening registers the caches' invalidation handlers on the shared
//! [`EventChannel`]; closing (or dropping) removes them again.

use std::sync::{Arc, Weak};

use tracing::info;
use uuid::Uuid;

use super::config::CacheConfig;
use super::count::PaginationCountCache;
use super::entry::{Clock, SystemClock};
use super::events::{DomainEvent, EventChannel, EventKind, SubscriptionId};
use super::known_cards::KnownCardsCache;

pub struct SessionCaches {
    session_id: Uuid,
    known_cards: Arc<KnownCardsCache>,
    counts: Arc<PaginationCountCache>,
    channel: Arc<EventChannel>,
    subscriptions: Vec<SubscriptionId>,
}

impl SessionCaches {
    pub fn open(config: &CacheConfig, channel: Arc<EventChannel>) -> Self {
        Self::open_with_clock(config, channel, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: &CacheConfig,
        channel: Arc<EventChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let known_cards = Arc::new(KnownCardsCache::new(config, Arc::clone(&clock)));
        let counts = Arc::new(PaginationCountCache::new(config, clock));

        let subscriptions = vec![
            subscribe_weak(
                &channel,
                EventKind::ProgressChanged,
                &known_cards,
                KnownCardsCache::on_progress_changed,
            ),
            subscribe_weak(
                &channel,
                EventKind::DeckModified,
                &counts,
                PaginationCountCache::on_deck_modified,
            ),
            subscribe_weak(
                &channel,
                EventKind::ProgressChanged,
                &counts,
                PaginationCountCache::on_progress_changed,
            ),
        ];

        let session_id = Uuid::new_v4();
        info!(%session_id, "Session caches opened");

        Self {
            session_id,
            known_cards,
            counts,
            channel,
            subscriptions,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn known_cards(&self) -> &Arc<KnownCardsCache> {
        &self.known_cards
    }

    pub fn counts(&self) -> &Arc<PaginationCountCache> {
        &self.counts
    }

    /// Deregister the invalidation handlers. The caches stay usable but no
    /// longer react to events.
    pub fn close(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for id in self.subscriptions.drain(..) {
            self.channel.unsubscribe(id);
        }
        info!(session_id = %self.session_id, "Session caches closed");
    }
}

impl Drop for SessionCaches {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Subscribe a cache method without letting the channel keep the cache alive.
fn subscribe_weak<C>(
    channel: &EventChannel,
    kind: EventKind,
    cache: &Arc<C>,
    handle: fn(&C, &DomainEvent),
) -> SubscriptionId
where
    C: Send + Sync + 'static,
{
    let cache: Weak<C> = Arc::downgrade(cache);
    channel.subscribe(kind, move |event| {
        if let Some(cache) = cache.upgrade() {
            handle(&cache, event);
        }
    })
}
