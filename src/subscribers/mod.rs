//! # Event subscribers.
//!
//! - [`Subscribe`] trait for custom handlers
//! - [`SubscriberSet`] per-subscriber queues, workers and panic isolation
//! - [`SubscribeFn`] closure adapter
//! - [`LogWriter`] built-in `tracing` renderer (feature `logging`)
//!
//! ```text
//! Bus ──► listener ──► SubscriberSet::emit(Event)
//!                          ├──► LogWriter
//!                          ├──► Metrics
//!                          └──► Custom ...
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscribe_fn;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscribe_fn::SubscribeFn;
pub use subscriber_set::SubscriberSet;
