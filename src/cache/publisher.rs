//! Event publisher for the business layer.
//!
//! Deck and progress services call these after a successful write; they never
//! need to know which caches exist.

use std::sync::Arc;

use super::events::{Delivery, DomainEvent, EventChannel, ModificationKind};
use super::keys::{CardId, DeckId};

/// Thin publishing handle over the shared [`EventChannel`].
///
/// # Usage
///
/// ```ignore
/// // After a card was added to a deck:
/// publisher.deck_modified(deck.id, ModificationKind::CardAdded);
/// ```
#[derive(Clone)]
pub struct EventPublisher {
    channel: Arc<EventChannel>,
}

impl EventPublisher {
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self { channel }
    }

    pub fn publish(&self, event: impl Into<Option<DomainEvent>>) -> Option<Delivery> {
        self.channel.publish(event)
    }

    /// Cards were added, removed or edited, or the deck itself changed.
    pub fn deck_modified(&self, deck_id: DeckId, kind: ModificationKind) -> Option<Delivery> {
        self.publish(DomainEvent::deck_modified(deck_id, kind))
    }

    /// A single card flipped between known and unknown.
    pub fn card_status_changed(&self, deck_id: DeckId, card_id: CardId) -> Option<Delivery> {
        self.publish(DomainEvent::card_status_changed(deck_id, card_id))
    }

    /// All progress in the deck was reset.
    pub fn deck_reset(&self, deck_id: DeckId) -> Option<Delivery> {
        self.publish(DomainEvent::deck_reset(deck_id))
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::cache::events::EventKind;

    #[test]
    fn convenience_methods_publish_matching_events() {
        let channel = Arc::new(EventChannel::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::DeckModified, EventKind::ProgressChanged] {
            let sink = Arc::clone(&seen);
            channel.subscribe(kind, move |event| {
                sink.lock().expect("sink lock").push(event.clone());
            });
        }
        let publisher = EventPublisher::new(Arc::clone(&channel));

        publisher.deck_modified(1, ModificationKind::CardsImported);
        publisher.card_status_changed(1, 4);
        publisher.deck_reset(2);
        assert!(publisher.publish(None::<DomainEvent>).is_none());

        assert_eq!(
            seen.lock().expect("lock").as_slice(),
            &[
                DomainEvent::deck_modified(1, ModificationKind::CardsImported),
                DomainEvent::card_status_changed(1, 4),
                DomainEvent::deck_reset(2),
            ]
        );
    }

    #[test]
    fn delivery_reports_handler_count() {
        let channel = Arc::new(EventChannel::new());
        channel.subscribe(EventKind::ProgressChanged, |_| {});
        let publisher = EventPublisher::new(channel);

        let delivery = publisher.deck_reset(3).expect("delivered");
        assert_eq!(delivery.delivered, 1);
        let delivery = publisher
            .deck_modified(3, ModificationKind::DeckDeleted)
            .expect("delivered");
        assert_eq!(delivery.delivered, 0);
    }
}
