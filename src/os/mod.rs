//! OS process layer.
//!
//! The supervisor never talks to the kernel directly; it goes through
//! [`ProcessControl`], a five-call interface small enough to fake in tests:
//!
//! ```text
//! children(pid)   direct children (ppid == pid)
//! is_alive(pid)   tracked by the OS, non-zero, not a zombie
//! terminate(pid)  graceful signal (SIGTERM)
//! kill(pid)       forced signal (SIGKILL)
//! reap(pid)       non-blocking wait; exit code once our child is gone
//! ```
//!
//! [`UnixProcessControl`] implements it with `nix` and `procfs`. [`stop_tree`]
//! builds the term → wait → kill → wait → reap sequence on top.

mod tree;
mod unix;

pub use tree::{StopOutcome, collect_tree, stop_tree};
pub use unix::{UnixProcessControl, pid_alive};

use crate::error::OsError;

/// OS process id.
pub type Pid = i32;

/// Platform process operations used by the supervisor.
///
/// Calls must be quick (no waiting); all waiting is done by callers with the
/// model lock released.
pub trait ProcessControl: Send + Sync + 'static {
    /// Direct children of `pid`.
    fn children(&self, pid: Pid) -> Vec<Pid>;

    /// True if `pid` exists, is positive and is not a zombie.
    fn is_alive(&self, pid: Pid) -> bool;

    /// Sends the graceful-termination signal. A vanished process is not an error.
    fn terminate(&self, pid: Pid) -> Result<(), OsError>;

    /// Sends the forced-kill signal. A vanished process is not an error.
    fn kill(&self, pid: Pid) -> Result<(), OsError>;

    /// Collects the exit status of our child `pid` if it has exited.
    ///
    /// Returns the exit code, or `128 + signal` for a signal death; `None` if the
    /// process is still running or is not our child.
    fn reap(&self, pid: Pid) -> Option<i32>;
}
