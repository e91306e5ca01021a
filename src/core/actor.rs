//! # Start-with-retry and the shared failure path.
//!
//! Every way a process can go down (launch error, readiness timeout, crash seen by the
//! monitor, liveness breach, oneshot failure) ends up in [`fail`], which decides between
//! retrying and giving up.
//!
//! ```text
//! start_with_retry(driver):
//! loop {
//!   ├─► run_attempt()            ── Ok ──► Running / Completed, done
//!   └─► fail(err)
//!         ├─► superseded/vanished          → Err (someone else owns the process)
//!         ├─► stop token cancelled         → Stopped, Err(Canceled)
//!         ├─► restart window elapsed       → restart_count = 0
//!         ├─► retryable && policy allows   → restart_count += 1, Restarting
//!         │                                  BackoffScheduled, cancellable sleep, continue
//!         └─► otherwise                    → Failed, ProcessFailed
//!                                            critical → shutdown requested, Err(CriticalExhausted)
//! }
//! ```
//!
//! ## Rules
//! - Oneshot failures are never retried here.
//! - Delay for retry `n` (1-based) is `min(restart_delay * 2^(n-1), max_restart_delay)`.
//! - Events are published after the lock is released.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::registry::Driver;
use super::runner::run_attempt;
use super::supervisor::Supervisor;
use crate::error::ProcessError;
use crate::events::{Event, EventKind};
use crate::model::ProcessState;

enum Verdict {
    Retry { delay: Duration, attempt: u32 },
    GiveUp { critical: bool },
    Canceled,
}

/// Launches the process behind `driver`, retrying per its restart policy.
pub(super) async fn start_with_retry(
    sup: &Supervisor,
    driver: &Driver,
    stop: &CancellationToken,
) -> Result<(), ProcessError> {
    loop {
        match run_attempt(sup, driver, stop).await {
            Ok(()) => return Ok(()),
            Err(err) => fail(sup, driver, err, stop).await?,
        }
    }
}

/// Handles a process that went down outside a start attempt (crash, liveness breach).
///
/// Runs the failure path and, if it schedules a retry, the regular retry loop.
pub(super) async fn recover(sup: Arc<Supervisor>, driver: Driver, cause: ProcessError) {
    let stop = sup.stop_token();
    let res = match fail(&sup, &driver, cause, &stop).await {
        Ok(()) => start_with_retry(&sup, &driver, &stop).await,
        Err(e) => Err(e),
    };
    if let Err(e) = res {
        tracing::debug!(process = %driver.name, error = %e, "recovery ended");
    }
}

/// Records `err` and decides what happens next.
///
/// Returns `Ok(())` after the backoff sleep when another attempt should be made.
pub(super) async fn fail(
    sup: &Supervisor,
    driver: &Driver,
    err: ProcessError,
    stop: &CancellationToken,
) -> Result<(), ProcessError> {
    if matches!(
        err,
        ProcessError::Vanished { .. } | ProcessError::Superseded { .. } | ProcessError::NotFound { .. }
    ) {
        tracing::debug!(process = %driver.name, error = %err, "attempt abandoned");
        return Err(err);
    }
    let name = driver.name.as_str();

    let (verdict, ev) = {
        let mut reg = sup.registry.lock().await;
        let info = reg.owned(driver)?;
        info.pid = None;

        if stop.is_cancelled() || matches!(err, ProcessError::Canceled { .. }) {
            info.state = ProcessState::Stopped;
            let ev = Event::for_process(EventKind::ProcessStopped, info).with_reason("supervisor stopping");
            (Verdict::Canceled, ev)
        } else {
            info.last_error = Some(err.as_message());
            if let ProcessError::Exited { code, .. } = &err {
                info.last_exit_code = *code;
            }
            if let (Some(window), Some(started)) = (sup.cfg.restart_window_limit(), info.last_start) {
                if started.elapsed() > window {
                    info.restart_count = 0;
                }
            }

            let retry = !info.oneshot
                && err.is_retryable()
                && info.restart_policy().allows(info.restart_count);
            if retry {
                info.restart_count += 1;
                info.state = ProcessState::Restarting;
                let attempt = info.restart_count;
                let delay = info.backoff().delay_for(attempt);
                let ev = Event::for_process(EventKind::BackoffScheduled, info)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.as_message());
                (Verdict::Retry { delay, attempt }, ev)
            } else {
                info.state = ProcessState::Failed;
                let ev = Event::for_process(EventKind::ProcessFailed, info)
                    .with_exit_code(info.last_exit_code)
                    .with_reason(err.as_message());
                (Verdict::GiveUp { critical: info.critical }, ev)
            }
        }
    };
    sup.bus.publish(ev);

    match verdict {
        Verdict::Canceled => Err(ProcessError::Canceled {
            name: name.to_string(),
        }),
        Verdict::Retry { delay, attempt } => {
            tracing::info!(
                process = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "restart scheduled"
            );
            tokio::select! {
                _ = sleep(delay) => Ok(()),
                _ = stop.cancelled() => {
                    mark_stopped(sup, driver).await;
                    Err(ProcessError::Canceled { name: name.to_string() })
                }
            }
        }
        Verdict::GiveUp { critical: false } => {
            tracing::warn!(process = name, error = %err, "giving up");
            Err(err)
        }
        Verdict::GiveUp { critical: true } => {
            tracing::error!(process = name, error = %err, "critical process gave up");
            sup.request_shutdown(name, &err);
            Err(ProcessError::CriticalExhausted {
                name: name.to_string(),
                cause: err.to_string(),
            })
        }
    }
}

async fn mark_stopped(sup: &Supervisor, driver: &Driver) {
    let ev = {
        let mut reg = sup.registry.lock().await;
        reg.owned(driver).ok().map(|info| {
            info.state = ProcessState::Stopped;
            Event::for_process(EventKind::ProcessStopped, info).with_reason("supervisor stopping")
        })
    };
    if let Some(ev) = ev {
        sup.bus.publish(ev);
    }
}
