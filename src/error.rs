//! Error types used by the procvisor runtime.
//!
//! - [`ResolveError`] the group dependency graph cannot be ordered.
//! - [`ProcessError`] a single supervised process could not be started, kept alive or stopped.
//! - [`SetupError`] the process/group model handed to the builder is inconsistent.
//! - [`OsError`] a signal could not be delivered.
//!
//! Runtime enums provide `as_label` (stable snake_case for logs/metrics) and `as_message`.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the dependency resolver.
///
/// Both variants are fatal to the calling bulk operation and never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The group graph contains a cycle; `path` lists the groups along it.
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    Cycle {
        /// Groups forming the cycle, first element repeated at the end.
        path: Vec<String>,
    },

    /// A group declares a dependency on a group that was never registered.
    #[error("group '{group}' depends on unknown group '{dependency}'")]
    MissingDependency {
        /// Group carrying the dangling edge.
        group: String,
        /// Name that could not be found.
        dependency: String,
    },
}

impl ResolveError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::ResolveError;
    ///
    /// let err = ResolveError::Cycle { path: vec!["a".into(), "b".into(), "a".into()] };
    /// assert_eq!(err.as_label(), "resolve_cycle");
    /// assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolveError::Cycle { .. } => "resolve_cycle",
            ResolveError::MissingDependency { .. } => "resolve_missing_dependency",
        }
    }
}

/// # Errors produced while driving a single process.
///
/// Every per-process failure is also written into
/// [`ProcessInfo::last_error`](crate::ProcessInfo::last_error) and published as an event;
/// public operations only surface it as the `Err` side of their result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// No process with this name is registered.
    #[error("process '{name}' not found")]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// The process was removed from the model while an operation was in flight.
    #[error("process '{name}' disappeared while being driven")]
    Vanished {
        /// Process name.
        name: String,
    },

    /// Another operation (stop, restart, monitor recovery) took over the process.
    #[error("process '{name}' was taken over by another operation")]
    Superseded {
        /// Process name.
        name: String,
    },

    /// The process is excluded on this node (skip flag or node filter).
    #[error("process '{name}' cannot be started: {reason}")]
    Skipped {
        /// Process name.
        name: String,
        /// Why it is excluded.
        reason: &'static str,
    },

    /// The process is already starting, running or restarting.
    #[error("process '{name}' is already active")]
    AlreadyActive {
        /// Process name.
        name: String,
    },

    /// The OS refused to spawn the command.
    #[error("failed to launch '{name}': {error}")]
    Launch {
        /// Process name.
        name: String,
        /// OS error text.
        error: String,
    },

    /// The readiness probe never succeeded within its total timeout.
    #[error("process '{name}' not ready after {timeout:?}")]
    ReadinessTimeout {
        /// Process name.
        name: String,
        /// Configured total readiness timeout.
        timeout: Duration,
    },

    /// The process exited (crash before/after readiness, or oneshot with non-zero code).
    #[error("process '{name}' exited with code {}", fmt_code(.code))]
    Exited {
        /// Process name.
        name: String,
        /// Exit code (`128 + signal` for signal deaths), `None` if it could not be collected.
        code: Option<i32>,
    },

    /// A oneshot process did not finish within its timeout and was killed.
    #[error("oneshot '{name}' did not finish within {timeout:?}")]
    OneshotTimeout {
        /// Process name.
        name: String,
        /// Configured oneshot timeout.
        timeout: Duration,
    },

    /// The liveness probe failed `failures` times in a row.
    #[error("process '{name}' failed {failures} consecutive health checks")]
    Unhealthy {
        /// Process name.
        name: String,
        /// Consecutive failures observed.
        failures: u32,
    },

    /// A critical process used up its retries (or has retries disabled).
    #[error("critical process '{name}' gave up: {cause}")]
    CriticalExhausted {
        /// Process name.
        name: String,
        /// Text of the last underlying failure.
        cause: String,
    },

    /// The supervisor is stopping; the operation was abandoned.
    #[error("operation on '{name}' cancelled by supervisor shutdown")]
    Canceled {
        /// Process name.
        name: String,
    },

    /// Group ordering failed before any process was touched.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "unknown".to_string(),
    }
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::ProcessError;
    ///
    /// let err = ProcessError::Exited { name: "sm".into(), code: Some(1) };
    /// assert_eq!(err.as_label(), "process_exited");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::NotFound { .. } => "process_not_found",
            ProcessError::Vanished { .. } => "process_vanished",
            ProcessError::Superseded { .. } => "process_superseded",
            ProcessError::Skipped { .. } => "process_skipped",
            ProcessError::AlreadyActive { .. } => "process_already_active",
            ProcessError::Launch { .. } => "process_launch_failed",
            ProcessError::ReadinessTimeout { .. } => "process_readiness_timeout",
            ProcessError::Exited { .. } => "process_exited",
            ProcessError::OneshotTimeout { .. } => "process_oneshot_timeout",
            ProcessError::Unhealthy { .. } => "process_unhealthy",
            ProcessError::CriticalExhausted { .. } => "process_critical_exhausted",
            ProcessError::Canceled { .. } => "process_canceled",
            ProcessError::Resolve(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProcessError::Launch { error, .. } => format!("launch: {error}"),
            ProcessError::ReadinessTimeout { timeout, .. } => format!("ready check timeout: {timeout:?}"),
            ProcessError::Exited { code, .. } => format!("exit code {}", fmt_code(code)),
            ProcessError::OneshotTimeout { timeout, .. } => format!("oneshot timeout: {timeout:?}"),
            ProcessError::Unhealthy { failures, .. } => format!("health check failed {failures} times"),
            other => other.to_string(),
        }
    }

    /// Indicates whether the restart policy may retry after this error.
    ///
    /// Launch failures, readiness timeouts, exits and liveness failures are retryable;
    /// model and cancellation errors are not.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use procvisor::ProcessError;
    ///
    /// let timeout = ProcessError::ReadinessTimeout { name: "a".into(), timeout: Duration::from_secs(1) };
    /// assert!(timeout.is_retryable());
    ///
    /// let gone = ProcessError::Vanished { name: "a".into() };
    /// assert!(!gone.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessError::Launch { .. }
                | ProcessError::ReadinessTimeout { .. }
                | ProcessError::Exited { .. }
                | ProcessError::Unhealthy { .. }
        )
    }
}

/// # Errors raised while assembling the process/group model.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// A process names a group that was never added.
    #[error("process '{process}' belongs to unknown group '{group}'")]
    UnknownGroup {
        /// Process name.
        process: String,
        /// Group name it refers to (empty if none was given).
        group: String,
    },

    /// A group lists a process that was never added.
    #[error("group '{group}' lists unknown process '{process}'")]
    UnknownProcess {
        /// Group name.
        group: String,
        /// Missing process name.
        process: String,
    },

    /// A process is claimed by more than one group.
    #[error("process '{process}' belongs to both '{first}' and '{second}'")]
    DuplicateMembership {
        /// Process name.
        process: String,
        /// First group claiming it.
        first: String,
        /// Second group claiming it.
        second: String,
    },

    /// Two processes share a name.
    #[error("process '{0}' registered twice")]
    DuplicateProcess(String),
}

/// # Errors raised by the OS process layer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OsError {
    /// Delivering a signal failed for a reason other than the target being gone.
    #[error("failed to send {signal} to pid {pid}: {reason}")]
    Signal {
        /// Target pid.
        pid: i32,
        /// Signal name.
        signal: &'static str,
        /// OS error text.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_error_wraps_into_process_error() {
        let err: ProcessError = ResolveError::MissingDependency {
            group: "sm".into(),
            dependency: "naming".into(),
        }
        .into();
        assert_eq!(err.as_label(), "resolve_missing_dependency");
        assert_eq!(
            err.to_string(),
            "group 'sm' depends on unknown group 'naming'"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn exited_without_code_renders_unknown() {
        let err = ProcessError::Exited {
            name: "io".into(),
            code: None,
        };
        assert_eq!(err.to_string(), "process 'io' exited with code unknown");
        assert_eq!(err.as_message(), "exit code unknown");
    }

    #[test]
    fn critical_exhausted_is_not_retryable() {
        let err = ProcessError::CriticalExhausted {
            name: "sm".into(),
            cause: "boom".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.as_label(), "process_critical_exhausted");
    }
}
