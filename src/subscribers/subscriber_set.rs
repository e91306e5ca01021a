//! # Non-blocking event fan-out to multiple subscribers.
//!
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► sub1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► sub2.on_event()
//!     └──► [queue N] ──► worker N ──► subN.on_event()
//! ```
//!
//! ## Rules
//! - `emit()` uses `try_send` and returns immediately.
//! - Per-subscriber FIFO; no ordering across subscribers.
//! - Full or closed queue: the event is dropped for that subscriber and
//!   `SubscriberOverflow` is published (never for an overflow event itself).
//! - A panicking handler is caught with `catch_unwind`, reported as
//!   `SubscriberPanicked`, and the worker moves on to the next event.
//!
//! `AssertUnwindSafe` is used; a subscriber that panics while holding its own lock
//! may leave that state poisoned.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Worker {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    join: JoinHandle<()>,
}

/// Fan-out coordinator with one bounded queue and worker per subscriber.
pub struct SubscriberSet {
    workers: Vec<Worker>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let workers = subs
            .into_iter()
            .map(|sub| Self::spawn_worker(sub, bus.clone()))
            .collect();
        Self { workers, bus }
    }

    fn spawn_worker(sub: Arc<dyn Subscribe>, bus: Bus) -> Worker {
        let name = sub.name();
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));

        let join = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let handled = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
                    .catch_unwind()
                    .await;
                if let Err(payload) = handled {
                    bus.publish(Event::subscriber_panicked(name, panic_message(&*payload)));
                }
            }
        });

        Worker { name, tx, join }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: Event) {
        let event = Arc::new(event);
        let is_overflow = event.is_subscriber_overflow();

        for w in &self.workers {
            let reason = match w.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                tracing::warn!(subscriber = w.name, reason, "subscriber dropped event");
                self.bus.publish(Event::subscriber_overflow(w.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(self) {
        let mut joins = Vec::with_capacity(self.workers.len());
        for w in self.workers {
            drop(w.tx);
            joins.push(w.join);
        }
        for j in joins {
            let _ = j.await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
