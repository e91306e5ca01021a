//! # Monitor loop: crash detection and liveness probing.
//!
//! ```text
//! every cfg.monitor_interval():
//!   skip tick if the stop token is cancelled
//!   lock   → snapshot Running daemons (name, pid, liveness check)
//!   unlock → is_alive(pid)?
//!              no  → reap exit code ─► ProcessExited, claim, spawn recover(Exited)
//!              yes → liveness checks run concurrently (check_once each)
//!   lock   → success resets health_fail_count; failure increments it
//!            count reaches threshold ─► HealthCheckFailed, claim,
//!                                       spawn { stop_tree(pid); recover(Unhealthy) }
//! ```
//!
//! Recoveries run as their own tasks so one slow restart never delays the next tick.
//! A process whose state or pid changed between snapshot and re-lock is left alone.

use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::actor;
use super::registry::Driver;
use super::supervisor::Supervisor;
use crate::error::ProcessError;
use crate::events::{Event, EventKind};
use crate::model::{ProcessState, ReadyCheck};
use crate::os::{Pid, stop_tree};

struct Watched {
    name: String,
    pid: Pid,
    liveness: Option<ReadyCheck>,
}

/// Spawns the loop; it ends when `token` is cancelled or the supervisor is dropped.
pub(super) fn spawn(sup: &Arc<Supervisor>, token: CancellationToken) -> JoinHandle<()> {
    let weak: Weak<Supervisor> = Arc::downgrade(sup);
    let period = sup.cfg.monitor_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(sup) = weak.upgrade() else {
                break;
            };
            tick(&sup).await;
        }
        tracing::debug!("monitor stopped");
    })
}

/// One monitor pass.
pub(super) async fn tick(sup: &Arc<Supervisor>) {
    if sup.stop_token().is_cancelled() {
        return;
    }

    let watched: Vec<Watched> = {
        let reg = sup.registry.lock().await;
        reg.iter()
            .filter(|p| p.state == ProcessState::Running && !p.oneshot)
            .filter_map(|p| {
                Some(Watched {
                    name: p.name.clone(),
                    pid: p.pid?,
                    liveness: p
                        .health_check
                        .clone()
                        .filter(|c| !c.is_empty() && p.health_fail_threshold > 0),
                })
            })
            .collect()
    };

    let mut alive = Vec::with_capacity(watched.len());
    for w in watched {
        if sup.control.is_alive(w.pid) {
            alive.push(w);
        } else {
            let code = sup.control.reap(w.pid);
            on_exit(sup, &w, code).await;
        }
    }

    let probes = alive.into_iter().filter_map(|w| {
        let check = w.liveness.clone()?;
        Some(async move {
            let ok = sup.prober.check_once(&check).await;
            (w, ok)
        })
    });
    for (w, ok) in join_all(probes).await {
        on_probe(sup, &w, ok).await;
    }
}

async fn on_exit(sup: &Arc<Supervisor>, w: &Watched, code: Option<i32>) {
    let claimed = {
        let mut reg = sup.registry.lock().await;
        match reg.get_mut(&w.name) {
            Some(info) if info.state == ProcessState::Running && info.pid == Some(w.pid) => {
                info.state = ProcessState::Restarting;
                info.pid = None;
                info.last_exit_code = code;
                let ev = Event::for_process(EventKind::ProcessExited, info)
                    .with_pid(w.pid)
                    .with_exit_code(code);
                reg.claim(&w.name).ok().map(|driver| (driver, ev))
            }
            _ => None,
        }
    };
    let Some((driver, ev)) = claimed else {
        return;
    };
    sup.bus.publish(ev);
    tracing::warn!(process = %w.name, pid = w.pid, code = ?code, "process exited unexpectedly");

    let cause = ProcessError::Exited {
        name: w.name.clone(),
        code,
    };
    tokio::spawn(actor::recover(Arc::clone(sup), driver, cause));
}

async fn on_probe(sup: &Arc<Supervisor>, w: &Watched, ok: bool) {
    let breached: Option<(Driver, Event, u32)> = {
        let mut reg = sup.registry.lock().await;
        let Some(info) = reg.get_mut(&w.name) else {
            return;
        };
        if info.state != ProcessState::Running || info.pid != Some(w.pid) {
            return;
        }
        if ok {
            info.health_fail_count = 0;
            return;
        }

        info.health_fail_count += 1;
        let failures = info.health_fail_count;
        if failures < info.health_fail_threshold {
            tracing::debug!(process = %w.name, failures, "liveness probe failed");
            return;
        }
        info.health_fail_count = 0;
        info.state = ProcessState::Restarting;
        let ev = Event::for_process(EventKind::HealthCheckFailed, info)
            .with_attempt(failures)
            .with_reason(format!("{failures} consecutive liveness failures"));
        reg.claim(&w.name).ok().map(|driver| (driver, ev, failures))
    };
    let Some((driver, ev, failures)) = breached else {
        return;
    };
    sup.bus.publish(ev);
    tracing::warn!(process = %w.name, pid = w.pid, failures, "liveness threshold reached, restarting");

    let sup = Arc::clone(sup);
    let pid = w.pid;
    let cause = ProcessError::Unhealthy {
        name: w.name.clone(),
        failures,
    };
    tokio::spawn(async move {
        let out = stop_tree(sup.control.as_ref(), pid, sup.cfg.stop_timeout, sup.cfg.kill_timeout).await;
        if out.survivors {
            tracing::warn!(process = %driver.name, pid, "unhealthy process survived SIGKILL");
        }
        actor::recover(sup, driver, cause).await;
    });
}
