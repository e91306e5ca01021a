//! # One launch attempt of one process.
//!
//! ```text
//! lock   → state = Starting, last_start = now               ─► ProcessStarting
//! unlock → spawn (daemon or oneshot)
//! lock   → pid recorded (or abort if superseded)
//! unlock → daemon:  wait_for_ready  ⟂  exit watcher          (whichever finishes first)
//!          oneshot: wait for exit, bounded by oneshot_timeout
//!        → daemon:  post-ready hook                          ─► HookFailed (warning only)
//! lock   → state = Running / Completed, restart_count = 0    ─► ProcessStarted / ProcessCompleted
//! ```
//!
//! ## Rules
//! - The lock is never held across spawn, probe, hook, or wait.
//! - Every re-lock re-resolves the process through its [`Driver`].
//! - A process launched by this attempt and not committed is torn down before returning `Err`.
//! - Retry decisions are not made here (see `actor`).

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::launcher::{self, LaunchSpec};
use super::registry::Driver;
use super::supervisor::Supervisor;
use crate::error::ProcessError;
use crate::events::{Event, EventKind};
use crate::model::{ProcessState, ReadyCheck};
use crate::os::{Pid, ProcessControl};

const EXIT_POLL: Duration = Duration::from_millis(100);
const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

struct Prepared {
    spec: LaunchSpec,
    ready_check: ReadyCheck,
    after_run: Option<String>,
    oneshot: bool,
    oneshot_timeout: Duration,
}

enum Readiness {
    Ready,
    Exited(Option<i32>),
    TimedOut,
    Canceled,
}

/// Runs one attempt; `Ok` means the process is `Running` (or `Completed` for a oneshot).
pub(super) async fn run_attempt(
    sup: &Supervisor,
    driver: &Driver,
    stop: &CancellationToken,
) -> Result<(), ProcessError> {
    let (prepared, starting) = {
        let mut reg = sup.registry.lock().await;
        let info = reg.owned(driver)?;
        info.state = ProcessState::Starting;
        info.pid = None;
        info.last_start = Some(Instant::now());

        let ev = Event::for_process(EventKind::ProcessStarting, info)
            .with_attempt(info.restart_count + 1);
        let prepared = Prepared {
            spec: LaunchSpec::new(info, &sup.cfg),
            ready_check: info.ready_check.clone(),
            after_run: info.after_run.clone(),
            oneshot: info.oneshot,
            oneshot_timeout: info.oneshot_timeout,
        };
        (prepared, ev)
    };
    sup.bus.publish(starting);

    if prepared.oneshot {
        run_oneshot(sup, driver, &prepared).await
    } else {
        run_daemon(sup, driver, &prepared, stop).await
    }
}

async fn run_daemon(
    sup: &Supervisor,
    driver: &Driver,
    prepared: &Prepared,
    stop: &CancellationToken,
) -> Result<(), ProcessError> {
    let name = driver.name.as_str();
    let pid = launcher::spawn_daemon(&prepared.spec).await?;
    record_pid(sup, driver, pid).await?;
    tracing::debug!(process = name, pid, "spawned");

    match await_ready(sup, &prepared.ready_check, pid, stop).await {
        Readiness::Ready => {}
        Readiness::Exited(code) => {
            return Err(ProcessError::Exited {
                name: name.to_string(),
                code,
            });
        }
        Readiness::TimedOut => {
            abort(sup, pid).await;
            return Err(ProcessError::ReadinessTimeout {
                name: name.to_string(),
                timeout: prepared.ready_check.timeout,
            });
        }
        Readiness::Canceled => {
            abort(sup, pid).await;
            return Err(ProcessError::Canceled {
                name: name.to_string(),
            });
        }
    }

    if let Some(hook) = &prepared.after_run {
        if let Err(reason) = launcher::run_hook(&prepared.spec, hook, HOOK_TIMEOUT).await {
            tracing::warn!(process = name, %reason, "post-ready hook failed");
            sup.bus.publish(
                Event::new(EventKind::HookFailed)
                    .with_process(name)
                    .with_pid(pid)
                    .with_reason(reason),
            );
        }
    }

    let committed = {
        let mut reg = sup.registry.lock().await;
        reg.owned(driver).map(|info| {
            info.state = ProcessState::Running;
            info.restart_count = 0;
            info.health_fail_count = 0;
            info.last_error = None;
            Event::for_process(EventKind::ProcessStarted, info)
        })
    };
    match committed {
        Ok(ev) => {
            sup.bus.publish(ev);
            tracing::info!(process = name, pid, "running");
            Ok(())
        }
        Err(e) => {
            abort(sup, pid).await;
            Err(e)
        }
    }
}

async fn run_oneshot(sup: &Supervisor, driver: &Driver, prepared: &Prepared) -> Result<(), ProcessError> {
    let name = driver.name.as_str();
    let child = launcher::spawn_oneshot(&prepared.spec)?;
    let Some(pid) = child.id().map(|id| id as Pid) else {
        return Err(ProcessError::Exited {
            name: name.to_string(),
            code: None,
        });
    };
    record_pid(sup, driver, pid).await?;

    let wait = child.wait_with_output();
    tokio::pin!(wait);
    let output = tokio::select! {
        out = &mut wait => out,
        _ = sleep(prepared.oneshot_timeout) => {
            abort(sup, pid).await;
            return Err(ProcessError::OneshotTimeout {
                name: name.to_string(),
                timeout: prepared.oneshot_timeout,
            });
        }
    };
    let output = output.map_err(|e| ProcessError::Launch {
        name: name.to_string(),
        error: e.to_string(),
    })?;

    let code = exit_code(output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        tracing::debug!(process = name, stdout = %stdout.trim_end(), "oneshot output");
    }
    if code != Some(0) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!(process = name, stderr = %stderr.trim_end(), "oneshot stderr");
        }
        return Err(ProcessError::Exited {
            name: name.to_string(),
            code,
        });
    }

    let ev = {
        let mut reg = sup.registry.lock().await;
        let info = reg.owned(driver)?;
        info.state = ProcessState::Completed;
        info.pid = None;
        info.last_exit_code = Some(0);
        info.restart_count = 0;
        info.last_error = None;
        Event::for_process(EventKind::ProcessCompleted, info).with_exit_code(Some(0))
    };
    sup.bus.publish(ev);
    tracing::info!(process = name, "completed");
    Ok(())
}

/// Stores the pid; a superseded attempt tears its process down instead.
async fn record_pid(sup: &Supervisor, driver: &Driver, pid: Pid) -> Result<(), ProcessError> {
    let recorded = {
        let mut reg = sup.registry.lock().await;
        reg.owned(driver).map(|info| info.pid = Some(pid))
    };
    if recorded.is_err() {
        abort(sup, pid).await;
    }
    recorded
}

async fn await_ready(
    sup: &Supervisor,
    check: &ReadyCheck,
    pid: Pid,
    stop: &CancellationToken,
) -> Readiness {
    tokio::select! {
        ready = sup.prober.wait_for_ready(check, check.timeout, stop) => {
            if ready {
                Readiness::Ready
            } else if stop.is_cancelled() {
                Readiness::Canceled
            } else {
                Readiness::TimedOut
            }
        }
        code = watch_exit(sup.control.as_ref(), pid) => Readiness::Exited(code),
    }
}

/// Resolves once `pid` is gone, with its exit code if it could be reaped.
pub(super) async fn watch_exit(ctl: &dyn ProcessControl, pid: Pid) -> Option<i32> {
    loop {
        if !ctl.is_alive(pid) {
            return ctl.reap(pid);
        }
        sleep(EXIT_POLL).await;
    }
}

async fn abort(sup: &Supervisor, pid: Pid) {
    let out = crate::os::stop_tree(
        sup.control.as_ref(),
        pid,
        sup.cfg.stop_timeout,
        sup.cfg.kill_timeout,
    )
    .await;
    tracing::debug!(pid, graceful = out.graceful, "aborted launch");
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}
