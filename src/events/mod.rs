//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (group and stop events), the retry loop
//!   (starting/started/backoff/failed), the monitor (exited/health), `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: the listener spawned by `SupervisorBuilder::build` (fans out to
//!   `SubscriberSet`) and any receiver from `Supervisor::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
