//! # Closure-backed subscriber (`SubscribeFn`)
//!
//! Wraps a synchronous `Fn(&Event)`; handy for collecting events in tests or
//! forwarding them into a channel.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use procvisor::{Event, Subscribe, SubscribeFn};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let sub = SubscribeFn::arc("collector", move |ev: &Event| {
//!     sink.lock().unwrap().push(ev.kind);
//! });
//! assert_eq!(sub.name(), "collector");
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Function-backed subscriber.
pub struct SubscribeFn<F> {
    name: &'static str,
    f: F,
}

impl<F> SubscribeFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    /// Creates a subscriber from a closure.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }

    /// Creates the subscriber as a shared handle.
    pub fn arc(name: &'static str, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> Subscribe for SubscribeFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &Event) {
        (self.f)(event);
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
