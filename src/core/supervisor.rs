//! # Supervisor: dependency-ordered process lifecycle.
//!
//! The [`Supervisor`] owns the process model (behind one `tokio::sync::Mutex`), the event
//! bus, the prober, and the OS process layer. Bulk and per-process operations run on the
//! caller's task; crash detection and liveness run on the monitor task.
//!
//! ## High-level architecture
//! ```text
//! SupervisorBuilder::build()
//!   ├─ Registry::new(groups, processes)    validation, DependencyResolver
//!   ├─ Bus + SubscriberSet listener        Bus.subscribe() ─► SubscriberSet::emit(Event)
//!   └─ Arc<Supervisor>
//!
//! start_all():
//!   fresh stop token
//!   resolve() ─► group A ─► group B ─► ...     (strict topological order)
//!                  └─ for each process (list order, not skip/manual/node-filtered):
//!                       start_with_retry()     (readiness confirmed before the next one)
//!                       critical gave up → abort, Err(CriticalExhausted)
//!
//! stop_all():
//!   cancel stop token                          (in-flight retries/readiness waits bail out)
//!   resolve_reverse() ─► ... ─► group B ─► group A
//!                  └─ for each process (reverse list order): stop_one()
//!   resolve failed → unordered sweep of every process
//!
//! stop_one(name):
//!   lock   → claim (older drivers become Superseded), state = Stopping
//!   unlock → stop_tree(pid, stop_timeout, kill_timeout)
//!   lock   → pid = None, state = Stopped (or Restarting when preserved) ─► ProcessStopped
//!
//! Monitor task (start_monitoring):
//!   every health_check_interval ─► crash detection + liveness ─► recover() ─► start_with_retry()
//! ```
//!
//! ## Rules
//! - The model lock is never held across spawn, probe, hook, signal wait, or sleep.
//! - `start_all`/`reload_all` install a fresh stop token; `stop_all` cancels it.
//! - Manual operations reuse the current token, or install a fresh one if it was cancelled.
//! - A critical process that gives up sets the shutdown-requested flag.
//!
//! ## Example
//! ```rust,no_run
//! use procvisor::{Config, ProcessGroup, ProcessInfo, ReadyCheck, SupervisorBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = SupervisorBuilder::new(Config::default())
//!         .group(ProcessGroup::new("core", 0))
//!         .group(ProcessGroup::new("apps", 1).depends_on("core"))
//!         .process(
//!             ProcessInfo::new("db", "core", "/usr/bin/db-server")
//!                 .with_ready_check(ReadyCheck::tcp("5432")),
//!         )
//!         .process(ProcessInfo::new("web", "apps", "/usr/bin/web-server"))
//!         .build()?;
//!
//!     sup.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::{Driver, Plan, Registry};
use super::{actor, launcher, monitor, run_list, shutdown};
use crate::config::Config;
use crate::error::ProcessError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{ProcessGroup, ProcessInfo, ProcessState};
use crate::os::{ProcessControl, stop_tree};
use crate::probe::Prober;

struct Tokens {
    /// Cancelled by `stop_all`; aborts retry sleeps and readiness waits.
    stop: CancellationToken,
    /// Cancelled when a critical process gives up.
    shutdown: CancellationToken,
}

struct MonitorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Coordinates process groups, readiness, restarts, and shutdown.
pub struct Supervisor {
    pub(super) cfg: Config,
    pub(super) bus: Bus,
    pub(super) prober: Prober,
    pub(super) control: Arc<dyn ProcessControl>,
    pub(super) registry: Mutex<Registry>,
    tokens: StdMutex<Tokens>,
    monitor: StdMutex<Option<MonitorHandle>>,
    listener: CancellationToken,
}

impl Supervisor {
    pub(super) fn new_internal(
        cfg: Config,
        bus: Bus,
        prober: Prober,
        control: Arc<dyn ProcessControl>,
        registry: Registry,
        listener: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            prober,
            control,
            registry: Mutex::new(registry),
            tokens: StdMutex::new(Tokens {
                stop: CancellationToken::new(),
                shutdown: CancellationToken::new(),
            }),
            monitor: StdMutex::new(None),
            listener,
        }
    }

    /// Shorthand for [`SupervisorBuilder::new`](super::SupervisorBuilder::new).
    pub fn builder(cfg: Config) -> super::SupervisorBuilder {
        super::SupervisorBuilder::new(cfg)
    }

    // ---- bulk operations ----

    /// Starts every eligible process, group by group in dependency order.
    ///
    /// Processes marked `skip` or `manual`, excluded by their node filter, or already
    /// active are passed over. Non-critical failures are recorded and startup continues;
    /// a critical process that gives up aborts the whole run.
    pub async fn start_all(&self) -> Result<(), ProcessError> {
        let stop = self.reset_tokens();
        let plan = self.registry.lock().await.start_plan()?;
        tracing::info!(node = %self.cfg.node_name, groups = plan.len(), "starting all processes");

        for (group, members) in plan {
            if stop.is_cancelled() {
                break;
            }
            self.bus
                .publish(Event::new(EventKind::GroupStarting).with_group(group.as_str()));
            tracing::info!(group = %group, "starting group");

            for name in members {
                if stop.is_cancelled() {
                    break;
                }
                let Some(driver) = self.claim_for_bulk_start(&name).await else {
                    continue;
                };
                match actor::start_with_retry(self, &driver, &stop).await {
                    Ok(()) => {}
                    Err(e @ ProcessError::CriticalExhausted { .. }) => return Err(e),
                    Err(e @ ProcessError::Canceled { .. }) => return Err(e),
                    Err(e) => {
                        tracing::warn!(process = %name, error = %e, "non-critical process failed, continuing");
                    }
                }
            }
        }
        Ok(())
    }

    /// Stops every running process in reverse dependency order.
    pub async fn stop_all(&self) {
        self.stop_token().cancel();
        tracing::info!("stopping all processes");
        self.stop_in_order(None, false).await;
    }

    /// Restarts the processes that are running, failed, or already restarting.
    ///
    /// All of them are stopped in reverse dependency order first, then started again in
    /// dependency order with a fresh retry budget.
    pub async fn restart_all(&self) -> Result<(), ProcessError> {
        let stop = self.live_token();
        let selected: HashSet<String> = {
            let mut reg = self.registry.lock().await;
            let node = self.cfg.node_name.as_str();
            let mut picked = HashSet::new();
            for info in reg.infos_mut() {
                let eligible = matches!(
                    info.state,
                    ProcessState::Running | ProcessState::Failed | ProcessState::Restarting
                );
                if eligible && !info.manual && info.exclusion(node).is_none() {
                    info.state = ProcessState::Restarting;
                    picked.insert(info.name.clone());
                }
            }
            picked
        };
        tracing::info!(count = selected.len(), "restarting processes");

        self.stop_in_order(Some(&selected), true).await;

        let plan = self.registry.lock().await.start_plan()?;
        for name in plan.into_iter().flat_map(|(_, members)| members) {
            if stop.is_cancelled() {
                break;
            }
            if !selected.contains(&name) {
                continue;
            }
            let driver = {
                let mut reg = self.registry.lock().await;
                let Some(info) = reg.get_mut(&name) else {
                    continue;
                };
                fresh_streak(info);
                reg.claim(&name)?
            };
            match actor::start_with_retry(self, &driver, &stop).await {
                Ok(()) => {}
                Err(e @ (ProcessError::CriticalExhausted { .. } | ProcessError::Canceled { .. })) => {
                    return Err(e);
                }
                Err(e) => tracing::warn!(process = %name, error = %e, "restart failed"),
            }
        }
        Ok(())
    }

    /// Full reload: stop everything, reset all runtime state, start everything.
    pub async fn reload_all(&self) -> Result<(), ProcessError> {
        tracing::info!("reloading all processes");
        {
            let mut reg = self.registry.lock().await;
            for info in reg.infos_mut() {
                if info.state.is_active() {
                    info.state = ProcessState::Restarting;
                }
            }
        }
        self.stop_token().cancel();
        self.stop_in_order(None, true).await;

        {
            let mut reg = self.registry.lock().await;
            // Claiming invalidates any driver still holding the old run.
            for name in reg.names() {
                if reg.claim(&name).is_err() {
                    continue;
                }
                if let Some(info) = reg.get_mut(&name) {
                    info.reset();
                }
            }
        }
        self.start_all().await
    }

    // ---- per-process operations ----

    /// Starts one process by name, including `manual` ones.
    pub async fn start_process(&self, name: &str) -> Result<(), ProcessError> {
        let driver = {
            let mut reg = self.registry.lock().await;
            let info = reg.get_mut(name).ok_or_else(|| not_found(name))?;
            if let Some(reason) = info.exclusion(&self.cfg.node_name) {
                return Err(ProcessError::Skipped {
                    name: name.to_string(),
                    reason,
                });
            }
            if info.state.is_active() {
                return Err(ProcessError::AlreadyActive {
                    name: name.to_string(),
                });
            }
            fresh_streak(info);
            reg.claim(name)?
        };
        let stop = self.live_token();
        actor::start_with_retry(self, &driver, &stop).await
    }

    /// Stops one process and its whole process tree.
    pub async fn stop_process(&self, name: &str) -> Result<(), ProcessError> {
        self.stop_one(name, false).await
    }

    /// Stops then starts one process with a fresh retry budget.
    pub async fn restart_process(&self, name: &str) -> Result<(), ProcessError> {
        {
            let mut reg = self.registry.lock().await;
            let info = reg.get_mut(name).ok_or_else(|| not_found(name))?;
            if let Some(reason) = info.exclusion(&self.cfg.node_name) {
                return Err(ProcessError::Skipped {
                    name: name.to_string(),
                    reason,
                });
            }
            info.state = ProcessState::Restarting;
        }
        self.stop_one(name, true).await?;

        let driver = {
            let mut reg = self.registry.lock().await;
            let info = reg.get_mut(name).ok_or_else(|| ProcessError::Vanished {
                name: name.to_string(),
            })?;
            fresh_streak(info);
            reg.claim(name)?
        };
        let stop = self.live_token();
        actor::start_with_retry(self, &driver, &stop).await
    }

    /// Stops a process and drops it from the model.
    pub async fn remove_process(&self, name: &str) -> Result<ProcessInfo, ProcessError> {
        self.stop_one(name, false).await?;
        self.registry
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| ProcessError::Vanished {
                name: name.to_string(),
            })
    }

    // ---- queries ----

    /// Snapshot of one process.
    pub async fn process_info(&self, name: &str) -> Option<ProcessInfo> {
        self.registry.lock().await.get(name).cloned()
    }

    /// Snapshots of all processes, sorted by name.
    pub async fn processes(&self) -> Vec<ProcessInfo> {
        self.registry.lock().await.processes()
    }

    /// All groups, by ascending `order`.
    pub async fn groups(&self) -> Vec<ProcessGroup> {
        self.registry.lock().await.groups()
    }

    /// Current state; unknown names report `Stopped`.
    pub async fn process_state(&self, name: &str) -> ProcessState {
        self.registry
            .lock()
            .await
            .get(name)
            .map(|p| p.state)
            .unwrap_or_default()
    }

    /// True when every process meant to run on this node is `Running`
    /// (or `Completed`, for oneshots). Skipped, filtered and manual processes are ignored.
    pub async fn all_running(&self) -> bool {
        let node = self.cfg.node_name.as_str();
        self.registry
            .lock()
            .await
            .iter()
            .filter(|p| p.exclusion(node).is_none() && !p.manual)
            .all(|p| {
                if p.oneshot {
                    p.state == ProcessState::Completed
                } else {
                    p.state == ProcessState::Running
                }
            })
    }

    /// True if any critical process is `Failed`.
    pub async fn any_critical_failed(&self) -> bool {
        self.registry
            .lock()
            .await
            .iter()
            .any(|p| p.critical && p.state == ProcessState::Failed)
    }

    /// Exact argument vector a launch of `name` would use.
    pub async fn full_args(&self, name: &str) -> Option<Vec<String>> {
        let reg = self.registry.lock().await;
        reg.get(name).map(|info| launcher::build_args(info, &self.cfg))
    }

    /// Dry-run listing of what [`start_all`](Self::start_all) would launch.
    pub async fn run_list(&self) -> Result<String, ProcessError> {
        let reg = self.registry.lock().await;
        run_list::render(&reg, &self.cfg).map_err(ProcessError::from)
    }

    /// Node name processes are filtered against.
    pub fn node_name(&self) -> &str {
        &self.cfg.node_name
    }

    /// Supervisor configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// New receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// True once a critical process has given up (cleared by `start_all`/`reload_all`).
    pub fn shutdown_requested(&self) -> bool {
        self.tokens().shutdown.is_cancelled()
    }

    // ---- monitoring ----

    /// Spawns the monitor task. Returns `false` if it is already running.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        let mut slot = self.monitor_slot();
        if slot.as_ref().is_some_and(|m| !m.join.is_finished()) {
            return false;
        }
        let token = CancellationToken::new();
        let join = monitor::spawn(self, token.clone());
        *slot = Some(MonitorHandle { token, join });
        tracing::debug!(interval = ?self.cfg.monitor_interval(), "monitor started");
        true
    }

    /// Stops the monitor task and waits for it to finish.
    pub async fn stop_monitoring(&self) {
        let handle = self.monitor_slot().take();
        if let Some(m) = handle {
            m.token.cancel();
            if let Err(e) = m.join.await {
                tracing::warn!(error = %e, "monitor task ended abnormally");
            }
        }
    }

    /// True while the monitor task is alive.
    pub fn is_monitoring(&self) -> bool {
        self.monitor_slot()
            .as_ref()
            .is_some_and(|m| !m.join.is_finished())
    }

    /// Starts everything, monitors until an OS termination signal or a critical
    /// failure, then stops monitoring and stops everything.
    pub async fn run_until_shutdown(self: &Arc<Self>) -> Result<(), ProcessError> {
        if let Err(e) = self.start_all().await {
            tracing::error!(error = %e, "startup failed, stopping");
            self.stop_all().await;
            return Err(e);
        }
        self.start_monitoring();

        let critical = self.tokens().shutdown.clone();
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "signal registration failed");
                }
                self.bus.publish(Event::new(EventKind::ShutdownRequested).with_reason("os signal"));
                tracing::info!("termination signal received");
            }
            _ = critical.cancelled() => {
                tracing::warn!("critical failure, shutting down");
            }
        }

        self.stop_monitoring().await;
        self.stop_all().await;
        Ok(())
    }

    // ---- internals ----

    /// Current stop token (possibly already cancelled).
    pub(super) fn stop_token(&self) -> CancellationToken {
        self.tokens().stop.clone()
    }

    /// Current stop token, replaced first if it was cancelled.
    fn live_token(&self) -> CancellationToken {
        let mut tokens = self.tokens();
        if tokens.stop.is_cancelled() {
            tokens.stop = CancellationToken::new();
        }
        tokens.stop.clone()
    }

    fn reset_tokens(&self) -> CancellationToken {
        let mut tokens = self.tokens();
        tokens.stop = CancellationToken::new();
        tokens.shutdown = CancellationToken::new();
        tokens.stop.clone()
    }

    /// Raises the supervisor-wide shutdown flag after a critical failure.
    pub(super) fn request_shutdown(&self, process: &str, cause: &ProcessError) {
        let shutdown = self.tokens().shutdown.clone();
        if shutdown.is_cancelled() {
            return;
        }
        shutdown.cancel();
        self.bus.publish(
            Event::new(EventKind::ShutdownRequested)
                .with_process(process)
                .with_reason(cause.as_message()),
        );
    }

    fn tokens(&self) -> MutexGuard<'_, Tokens> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<MonitorHandle>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn claim_for_bulk_start(&self, name: &str) -> Option<Driver> {
        let mut reg = self.registry.lock().await;
        let info = reg.get_mut(name)?;
        if let Some(reason) = info.exclusion(&self.cfg.node_name) {
            tracing::info!(process = name, reason, "skipping");
            return None;
        }
        if info.manual {
            tracing::info!(process = name, "skipping manual process");
            return None;
        }
        if info.state.is_active() {
            tracing::debug!(process = name, state = %info.state, "already active");
            return None;
        }
        fresh_streak(info);
        reg.claim(name).ok()
    }

    /// Stops `only` (or every process) in reverse dependency order.
    async fn stop_in_order(&self, only: Option<&HashSet<String>>, preserve_restarting: bool) {
        let plan: Plan = {
            let reg = self.registry.lock().await;
            match reg.stop_plan() {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot order shutdown, stopping unordered");
                    vec![(String::new(), reg.names())]
                }
            }
        };

        for (group, members) in plan {
            if !group.is_empty() {
                self.bus
                    .publish(Event::new(EventKind::GroupStopping).with_group(group.as_str()));
            }
            for name in members {
                if only.is_some_and(|set| !set.contains(&name)) {
                    continue;
                }
                if let Err(e) = self.stop_one(&name, preserve_restarting).await {
                    tracing::debug!(process = %name, error = %e, "stop skipped");
                }
            }
        }
    }

    /// Stops one process tree. With `preserve_restarting`, a process marked
    /// `Restarting` stays so instead of becoming `Stopped`.
    async fn stop_one(&self, name: &str, preserve_restarting: bool) -> Result<(), ProcessError> {
        let (driver, pid, keep) = {
            let mut reg = self.registry.lock().await;
            let info = reg.get_mut(name).ok_or_else(|| not_found(name))?;
            let keep = match (preserve_restarting, info.state) {
                (true, ProcessState::Restarting) => Some(ProcessState::Restarting),
                _ => None,
            };
            if info.pid.is_none() && !info.state.is_active() {
                return Ok(());
            }
            let pid = info.pid;
            if keep.is_none() {
                info.state = ProcessState::Stopping;
            }
            (reg.claim(name)?, pid, keep)
        };

        let mut exit_code = None;
        if let Some(pid) = pid {
            tracing::info!(process = name, pid, "stopping");
            let out = stop_tree(
                self.control.as_ref(),
                pid,
                self.cfg.stop_timeout,
                self.cfg.kill_timeout,
            )
            .await;
            if out.survivors {
                tracing::warn!(process = name, pid, "process tree survived SIGKILL");
            }
            exit_code = out.exit_code;
        }

        let ev = {
            let mut reg = self.registry.lock().await;
            match reg.owned(&driver) {
                Ok(info) => {
                    info.pid = None;
                    info.health_fail_count = 0;
                    if exit_code.is_some() {
                        info.last_exit_code = exit_code;
                    }
                    info.state = keep.unwrap_or(ProcessState::Stopped);
                    pid.map(|_| {
                        Event::for_process(EventKind::ProcessStopped, info).with_exit_code(exit_code)
                    })
                }
                // Taken over while we waited; the newer owner decides the state.
                Err(_) => None,
            }
        };
        if let Some(ev) = ev {
            self.bus.publish(ev);
        }
        Ok(())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(m) = self.monitor_slot().take() {
            m.token.cancel();
        }
        self.listener.cancel();
    }
}

/// Starts a new failure streak for an explicit (re)start.
fn fresh_streak(info: &mut ProcessInfo) {
    info.restart_count = 0;
    info.health_fail_count = 0;
    info.last_error = None;
}

fn not_found(name: &str) -> ProcessError {
    ProcessError::NotFound {
        name: name.to_string(),
    }
}
