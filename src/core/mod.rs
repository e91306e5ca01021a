//! Supervisor core: model, launch, retry, monitoring, and shutdown.
//!
//! The public API from this module is [`Supervisor`] and [`SupervisorBuilder`].
//!
//! Internal modules:
//! - [`registry`]: process/group model with generation-based claims;
//! - [`launcher`]: argument/environment building and OS spawns;
//! - [`runner`]: one launch attempt (spawn, readiness, hook, commit);
//! - [`actor`]: start-with-retry and the shared failure path;
//! - [`monitor`]: crash detection and liveness probing;
//! - [`run_list`]: dry-run rendering;
//! - [`shutdown`]: OS termination signals.

mod actor;
mod builder;
mod launcher;
mod monitor;
mod registry;
mod run_list;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use supervisor::Supervisor;

#[cfg(test)]
mod tests;
