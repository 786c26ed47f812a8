//! Broadcast channel for refresh events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Refresh cycles
//! publish [`SyncEvent`]s through the bus, and WebSocket connections
//! subscribe to receive the ones matching their dataset filter.

use tokio::sync::broadcast;

use super::SyncEvent;

/// Broadcast bus for [`SyncEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_event(dataset: &str) -> SyncEvent {
        SyncEvent::RefreshStarted {
            dataset: dataset.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(100);
        assert_eq!(bus.publish(make_event("market_order")), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_event() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        bus.publish(make_event("orders:jita"));

        let Ok(event) = rx.recv().await else {
            panic!("expected to receive event");
        };
        assert_eq!(event.dataset(), "orders:jita");
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(100);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
