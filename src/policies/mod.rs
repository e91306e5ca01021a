//! Retry policies applied by the per-process retry loop.
//!
//! - [`RestartPolicy`] whether another attempt is allowed (from `max_restarts`)
//! - [`BackoffPolicy`] how long to wait before it (from `restart_delay` / `max_restart_delay`)

mod backoff;
mod restart;

pub use backoff::BackoffPolicy;
pub use restart::RestartPolicy;
