//! Domain event channel.
//!
//! Defines the events the business layer raises when deck structure or study
//! progress changes, and a synchronous in-process bus that fans them out to
//! cache handlers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::keys::{CardId, DeckId};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::events";
pub const METRIC_EVENT_PUBLISHED: &str = "deckcache_event_published_total";

/// Monotonic epoch for ordering published events within this process.
pub type Epoch = u64;

/// Structural change applied to a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    DeckCreated,
    DeckUpdated,
    DeckDeleted,
    CardAdded,
    CardUpdated,
    CardRemoved,
    CardsImported,
}

/// Kind of study-progress change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressChangeKind {
    /// A single card flipped between known and unknown.
    CardStatusChanged,
    /// Every card of the deck was marked unknown.
    DeckReset,
}

/// State change signalled by the business layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// Cards were added, removed or edited, or the deck itself changed.
    DeckModified {
        deck_id: DeckId,
        kind: ModificationKind,
    },
    /// Known/unknown status changed. `card_id` is set only for single-card toggles.
    ProgressChanged {
        deck_id: DeckId,
        card_id: Option<CardId>,
        kind: ProgressChangeKind,
    },
}

impl DomainEvent {
    pub fn deck_modified(deck_id: DeckId, kind: ModificationKind) -> Self {
        Self::DeckModified { deck_id, kind }
    }

    pub fn card_status_changed(deck_id: DeckId, card_id: CardId) -> Self {
        Self::ProgressChanged {
            deck_id,
            card_id: Some(card_id),
            kind: ProgressChangeKind::CardStatusChanged,
        }
    }

    pub fn deck_reset(deck_id: DeckId) -> Self {
        Self::ProgressChanged {
            deck_id,
            card_id: None,
            kind: ProgressChangeKind::DeckReset,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::DeckModified { .. } => EventKind::DeckModified,
            DomainEvent::ProgressChanged { .. } => EventKind::ProgressChanged,
        }
    }

    pub fn deck_id(&self) -> DeckId {
        match self {
            DomainEvent::DeckModified { deck_id, .. }
            | DomainEvent::ProgressChanged { deck_id, .. } => *deck_id,
        }
    }
}

/// Selector used when subscribing to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeckModified,
    ProgressChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::DeckModified => "deck_modified",
            EventKind::ProgressChanged => "progress_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`EventChannel::subscribe`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Receipt for one published event.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Unique identifier of this publication (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub timestamp: OffsetDateTime,
    /// Number of handlers the event was delivered to.
    pub delivered: usize,
}

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Process-wide synchronous publish/subscribe bus.
///
/// Every handler subscribed to an event's kind runs on the publishing thread
/// before [`publish`](Self::publish) returns. Handlers should be cheap: a slow
/// handler delays the publisher.
pub struct EventChannel {
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscription: AtomicU64,
    epoch_counter: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// Register `handler` for every future event of `kind`.
    pub fn subscribe<H>(&self, kind: EventKind, handler: H) -> SubscriptionId
    where
        H: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        rw_write(&self.subscribers, SOURCE, "subscribe").push(Subscriber {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!(subscription = id.0, event_kind = %kind, "Event handler subscribed");
        id
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = rw_write(&self.subscribers, SOURCE, "unsubscribe");
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(subscription = id.0, "Event handler unsubscribed");
        }
        removed
    }

    /// Deliver `event` to every current subscriber of its kind.
    ///
    /// `None` is accepted and ignored so callers holding an optional event do not
    /// need to branch.
    pub fn publish(&self, event: impl Into<Option<DomainEvent>>) -> Option<Delivery> {
        let event = event.into()?;
        let kind = event.kind();

        // Snapshot so handlers can (un)subscribe without deadlocking on the list.
        let handlers: Vec<Handler> = rw_read(&self.subscribers, SOURCE, "publish")
            .iter()
            .filter(|subscriber| subscriber.kind == kind)
            .map(|subscriber| Arc::clone(&subscriber.handler))
            .collect();

        let delivery = Delivery {
            id: Uuid::new_v4(),
            epoch: self.epoch_counter.fetch_add(1, Ordering::SeqCst),
            timestamp: OffsetDateTime::now_utc(),
            delivered: handlers.len(),
        };

        info!(
            event_id = %delivery.id,
            event_epoch = delivery.epoch,
            event = ?event,
            handlers = delivery.delivered,
            "Domain event published"
        );
        counter!(METRIC_EVENT_PUBLISHED, "kind" => kind.as_str()).increment(1);

        for handler in handlers {
            handler(&event);
        }

        Some(delivery)
    }

    /// Number of registered handlers across all kinds.
    pub fn subscriber_count(&self) -> usize {
        rw_read(&self.subscribers, SOURCE, "subscriber_count").len()
    }

    /// Drop every handler. Called once at process teardown.
    pub fn shutdown(&self) {
        let mut subscribers = rw_write(&self.subscribers, SOURCE, "shutdown");
        let dropped = subscribers.len();
        subscribers.clear();
        info!(dropped, "Event channel shut down");
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
