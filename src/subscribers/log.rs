//! # LogWriter: renders events through `tracing`
//!
//! One record per event, at a level matching its severity.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  procvisor: starting process="sm" group="core" attempt=1
//! INFO  procvisor: started process="sm" pid=4242
//! WARN  procvisor: backoff scheduled process="sm" retry=2 delay_ms=2000 reason="ready check timeout: 10s"
//! ERROR procvisor: failed process="sm" reason="..."
//! INFO  procvisor: stopped process="sm" pid=4242 exit_code=Some(143)
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let process = e.process.as_deref().unwrap_or("-");
        let group = e.group.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ProcessStarting => {
                tracing::info!(target: "procvisor", process, group, attempt = ?e.attempt, "starting");
            }
            EventKind::ProcessStarted => {
                tracing::info!(target: "procvisor", process, group, pid = ?e.pid, "started");
            }
            EventKind::ProcessCompleted => {
                tracing::info!(target: "procvisor", process, group, exit_code = ?e.exit_code, "completed");
            }
            EventKind::ProcessFailed => {
                tracing::error!(target: "procvisor", process, group, attempt = ?e.attempt, reason, "failed");
            }
            EventKind::ProcessStopped => {
                tracing::info!(target: "procvisor", process, pid = ?e.pid, exit_code = ?e.exit_code, "stopped");
            }
            EventKind::ProcessExited => {
                tracing::warn!(target: "procvisor", process, pid = ?e.pid, exit_code = ?e.exit_code, "exited unexpectedly");
            }
            EventKind::BackoffScheduled => {
                tracing::warn!(
                    target: "procvisor",
                    process,
                    retry = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    reason,
                    "backoff scheduled"
                );
            }
            EventKind::HealthCheckFailed => {
                tracing::warn!(target: "procvisor", process, pid = ?e.pid, failures = ?e.attempt, "health check failed");
            }
            EventKind::HookFailed => {
                tracing::warn!(target: "procvisor", process, reason, "after-run hook failed");
            }
            EventKind::GroupStarting => {
                tracing::info!(target: "procvisor", group, "starting group");
            }
            EventKind::GroupStopping => {
                tracing::info!(target: "procvisor", group, "stopping group");
            }
            EventKind::ShutdownRequested => {
                tracing::warn!(target: "procvisor", process, reason, "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "procvisor", subscriber = ?e.subscriber, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "procvisor", subscriber = ?e.subscriber, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
