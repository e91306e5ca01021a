//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the supervisor, retry loops and the
//! monitor can publish without blocking.
//!
//! ```text
//! Publishers (many):                    Receivers:
//!   retry loops ──┐
//!   monitor     ──┼──► Bus ──┬──► builder listener ──► SubscriberSet
//!   supervisor  ──┤          └──► Supervisor::subscribe() (callers)
//!   subscribers ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; with no receivers the event is dropped.
//! - One shared ring buffer of `capacity` events; slow receivers observe
//!   `RecvError::Lagged(n)` and skip the `n` oldest items.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::GroupStarting));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::GroupStopping).with_group("io"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::GroupStopping);
        assert_eq!(ev.group.as_deref(), Some("io"));
    }
}
