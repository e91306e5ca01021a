//! # Process records: desired configuration plus observed runtime state.
//!
//! [`ProcessInfo`] is a plain record. Configuration fields are filled in once by the
//! loader; runtime fields (`state`, `pid`, counters, `last_*`) are written only by the
//! [`Supervisor`](crate::Supervisor) while it holds its model lock. Readers always get
//! cloned snapshots.
//!
//! ## Lifecycle
//! ```text
//! Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
//!                │            │
//!                │            └──► (crash / unhealthy) ──► Restarting ──► Starting ...
//!                ├──► Completed            (oneshot, exit 0)
//!                ├──► Restarting ──► ...   (retry allowed)
//!                └──► Failed               (retries exhausted or disabled)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ReadyCheck;
use crate::policies::{BackoffPolicy, RestartPolicy};

/// Observed state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Not running; no background work pending.
    #[default]
    Stopped,
    /// Launched, waiting for readiness.
    Starting,
    /// Ready and being monitored.
    Running,
    /// Oneshot finished with exit code 0.
    Completed,
    /// Gave up after retries (or retries disabled).
    Failed,
    /// Process tree is being terminated.
    Stopping,
    /// Between attempts; shown so readers see "in flux" instead of a stale `Stopped`.
    Restarting,
}

impl ProcessState {
    /// Lowercase name, as rendered by `Display`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
        }
    }

    /// `Starting`, `Running` or `Restarting`: someone owns this process right now.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Restarting)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration and runtime state of one supervised process.
///
/// All fields are public so loaders and tests can use struct-update syntax:
/// ```
/// use procvisor::{ProcessInfo, ReadyCheck};
///
/// let p = ProcessInfo {
///     max_restarts: -1,
///     ready_check: ReadyCheck::parse("tcp:2809"),
///     ..ProcessInfo::new("naming", "base", "/usr/bin/omniNames")
/// };
/// assert!(p.critical);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    // --- identity ---
    /// Unique process name.
    pub name: String,
    /// Name of the group this process belongs to.
    pub group: String,

    // --- launch spec ---
    /// Executable path or name (looked up in `PATH`).
    pub command: String,
    /// Arguments appended after the supervisor's common args.
    pub args: Vec<String>,
    /// When non-empty, replaces common args + `args`.
    pub raw_args: Vec<String>,
    /// Working directory; inherits the supervisor's when `None`.
    pub work_dir: Option<PathBuf>,
    /// Extra environment; values support `${VAR}` / `$VAR` expansion.
    pub env: BTreeMap<String, String>,

    // --- probes ---
    /// Readiness probe gating `Starting → Running`.
    pub ready_check: ReadyCheck,
    /// Optional liveness probe run by the monitor loop.
    pub health_check: Option<ReadyCheck>,
    /// Consecutive liveness failures that trigger a forced restart (`0` disables).
    pub health_fail_threshold: u32,
    /// Shell command run after readiness; failure only warns.
    pub after_run: Option<String>,

    // --- policy ---
    /// Unrecoverable failure requests supervisor-wide shutdown.
    pub critical: bool,
    /// `-1` never retry, `0` unlimited, `n > 0` at most `n` retries.
    pub max_restarts: i32,
    /// Base delay before the first retry.
    #[serde(with = "crate::duration_ms")]
    pub restart_delay: Duration,
    /// Upper bound for the exponential backoff.
    #[serde(with = "crate::duration_ms")]
    pub max_restart_delay: Duration,
    /// Node names this process runs on; empty means every node.
    pub node_filter: BTreeSet<String>,
    /// Never start.
    pub skip: bool,
    /// Excluded from bulk start; startable by name only.
    pub manual: bool,
    /// Runs to completion; exit 0 is success.
    pub oneshot: bool,
    /// Budget for a oneshot run before it is killed.
    #[serde(with = "crate::duration_ms")]
    pub oneshot_timeout: Duration,

    // --- runtime ---
    /// Current state.
    pub state: ProcessState,
    /// OS process id while a process is launched.
    pub pid: Option<i32>,
    /// Retries performed in the current failure streak.
    pub restart_count: u32,
    /// Exit code of the last run (`128 + signal` for signal deaths).
    pub last_exit_code: Option<i32>,
    /// When the last attempt was launched.
    #[serde(skip)]
    pub last_start: Option<Instant>,
    /// Text of the last failure.
    pub last_error: Option<String>,
    /// Consecutive liveness probe failures.
    pub health_fail_count: u32,
}

impl Default for ProcessInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            group: String::new(),
            command: String::new(),
            args: Vec::new(),
            raw_args: Vec::new(),
            work_dir: None,
            env: BTreeMap::new(),
            ready_check: ReadyCheck::default(),
            health_check: None,
            health_fail_threshold: 3,
            after_run: None,
            critical: true,
            max_restarts: 0,
            restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(30),
            node_filter: BTreeSet::new(),
            skip: false,
            manual: false,
            oneshot: false,
            oneshot_timeout: Duration::from_secs(30),
            state: ProcessState::Stopped,
            pid: None,
            restart_count: 0,
            last_exit_code: None,
            last_start: None,
            last_error: None,
            health_fail_count: 0,
        }
    }
}

impl ProcessInfo {
    /// Creates a process record with default policy.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the readiness probe.
    #[must_use]
    pub fn with_ready_check(mut self, check: ReadyCheck) -> Self {
        self.ready_check = check;
        self
    }

    /// Adds an environment entry.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Empty filter matches every node (including `""`); otherwise exact, case-sensitive membership.
    ///
    /// `skip` is not consulted here.
    pub fn should_run_on_node(&self, node: &str) -> bool {
        self.node_filter.is_empty() || self.node_filter.contains(node)
    }

    /// Clears runtime fields; configuration is kept.
    pub fn reset(&mut self) {
        self.state = ProcessState::Stopped;
        self.pid = None;
        self.restart_count = 0;
        self.last_exit_code = None;
        self.last_start = None;
        self.last_error = None;
        self.health_fail_count = 0;
    }

    /// Restart policy derived from `max_restarts`.
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::from_max_restarts(self.max_restarts)
    }

    /// Backoff derived from `restart_delay` and `max_restart_delay`.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.restart_delay, self.max_restart_delay)
    }

    /// Reason this process is excluded on `node`, if any.
    pub(crate) fn exclusion(&self, node: &str) -> Option<&'static str> {
        if self.skip {
            Some("skip flag set")
        } else if !self.should_run_on_node(node) {
            Some("node filter excludes this node")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_launcher_conventions() {
        let p = ProcessInfo::default();
        assert!(p.name.is_empty());
        assert!(p.critical);
        assert!(!p.skip && !p.manual && !p.oneshot);
        assert_eq!(p.max_restarts, 0);
        assert_eq!(p.max_restart_delay, Duration::from_secs(30));
        assert_eq!(p.oneshot_timeout, Duration::from_secs(30));
        assert_eq!(p.state, ProcessState::Stopped);
        assert_eq!(p.pid, None);
    }

    #[test]
    fn empty_filter_runs_everywhere() {
        let mut p = ProcessInfo::new("p", "g", "/bin/true");
        assert!(p.should_run_on_node(""));
        assert!(p.should_run_on_node("Node1"));

        p.node_filter = ["Node1".to_string()].into();
        assert!(p.should_run_on_node("Node1"));
        assert!(!p.should_run_on_node("node1"));
        assert!(!p.should_run_on_node(""));
    }

    #[test]
    fn skip_is_independent_of_node_filter() {
        let mut p = ProcessInfo::new("p", "g", "/bin/true");
        p.skip = true;
        p.node_filter = ["Node1".to_string()].into();
        assert!(p.should_run_on_node("Node1"));
        assert_eq!(p.exclusion("Node1"), Some("skip flag set"));
    }

    #[test]
    fn reset_keeps_configuration() {
        let mut p = ProcessInfo::new("sm", "core", "/usr/bin/sm").with_args(["--x"]);
        p.state = ProcessState::Failed;
        p.pid = Some(42);
        p.restart_count = 3;
        p.last_exit_code = Some(1);
        p.last_start = Some(Instant::now());
        p.last_error = Some("boom".into());
        p.health_fail_count = 2;

        p.reset();

        assert_eq!(p.name, "sm");
        assert_eq!(p.args, vec!["--x".to_string()]);
        assert_eq!(p.state, ProcessState::Stopped);
        assert_eq!(p.pid, None);
        assert_eq!(p.restart_count, 0);
        assert_eq!(p.last_exit_code, None);
        assert!(p.last_start.is_none());
        assert!(p.last_error.is_none());
        assert_eq!(p.health_fail_count, 0);
    }

    #[test]
    fn state_names_are_lowercase() {
        assert_eq!(ProcessState::Stopped.to_string(), "stopped");
        assert_eq!(ProcessState::Restarting.to_string(), "restarting");
        assert_eq!(serde_json::to_string(&ProcessState::Running).unwrap(), "\"running\"");
    }
}
