//! # Runtime events emitted by the supervisor.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Process lifecycle**: starting, started, completed, failed, stopped, exited
//! - **Recovery**: backoff scheduled, health check failed, hook failed
//! - **Supervisor**: group starting/stopping, shutdown requested
//! - **Subscriber**: overflow, panic
//!
//! [`Event`] carries optional metadata filled in according to the kind. Process
//! events also carry a [`ProcessInfo`] snapshot taken under the model lock, so
//! subscribers see a consistent view without calling back into the supervisor.
//!
//! ## Ordering guarantees
//! Each event has a globally unique, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_process("sm")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(2))
//!     .with_reason("ready check timeout");
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.process.as_deref(), Some("sm"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::model::ProcessInfo;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Process lifecycle ===
    /// An attempt is launching.
    ///
    /// Sets: `process`, `group`, `attempt` (1-based within the current streak), `snapshot`.
    ProcessStarting,

    /// Readiness confirmed; state is `Running`.
    ///
    /// Sets: `process`, `group`, `pid`, `snapshot`.
    ProcessStarted,

    /// Oneshot exited with code 0; state is `Completed`.
    ///
    /// Sets: `process`, `group`, `exit_code`, `snapshot`.
    ProcessCompleted,

    /// Gave up; state is `Failed`.
    ///
    /// Sets: `process`, `group`, `attempt`, `reason`, `snapshot`.
    ProcessFailed,

    /// Process tree terminated by a stop/restart/reload.
    ///
    /// Sets: `process`, `group`, `pid`, `exit_code` (if reaped), `snapshot`.
    ProcessStopped,

    /// Monitor found a `Running` process dead.
    ///
    /// Sets: `process`, `group`, `pid`, `exit_code` (if reaped), `snapshot`.
    ProcessExited,

    // === Recovery ===
    /// Next attempt scheduled after a failure.
    ///
    /// Sets: `process`, `group`, `attempt` (retry number), `delay_ms`, `reason`, `snapshot`.
    BackoffScheduled,

    /// Liveness probe failures reached the threshold; a forced restart follows.
    ///
    /// Sets: `process`, `group`, `pid`, `attempt` (consecutive failures), `snapshot`.
    HealthCheckFailed,

    /// Post-ready hook failed; the process keeps running.
    ///
    /// Sets: `process`, `group`, `reason`.
    HookFailed,

    // === Supervisor ===
    /// A group is about to be started.
    ///
    /// Sets: `group`.
    GroupStarting,

    /// A group is about to be stopped.
    ///
    /// Sets: `group`.
    GroupStopping,

    /// Supervisor-wide shutdown requested (OS signal or critical failure).
    ///
    /// Sets: `reason`, and `process` when a critical process caused it.
    ShutdownRequested,

    // === Subscriber ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason`.
    SubscriberOverflow,

    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `subscriber`, `reason` (panic message).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process name.
    pub process: Option<Arc<str>>,
    /// Group name.
    pub group: Option<Arc<str>>,
    /// OS process id.
    pub pid: Option<i32>,
    /// Attempt or retry number, depending on kind.
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Exit code (`128 + signal` for signal deaths).
    pub exit_code: Option<i32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Subscriber name for subscriber events.
    pub subscriber: Option<&'static str>,
    /// Process record as it was when the event was emitted.
    pub snapshot: Option<Arc<ProcessInfo>>,
}

impl Event {
    /// Creates an event of the given kind with the current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            group: None,
            pid: None,
            attempt: None,
            delay_ms: None,
            exit_code: None,
            reason: None,
            subscriber: None,
            snapshot: None,
        }
    }

    /// Creates a process event carrying name, group, pid and a snapshot of `info`.
    pub fn for_process(kind: EventKind, info: &ProcessInfo) -> Self {
        let mut ev = Event::new(kind)
            .with_process(info.name.as_str())
            .with_group(info.group.as_str());
        ev.pid = info.pid;
        ev.snapshot = Some(Arc::new(info.clone()));
        ev
    }

    /// Attaches a process name.
    #[inline]
    pub fn with_process(mut self, name: impl Into<Arc<str>>) -> Self {
        self.process = Some(name.into());
        self
    }

    /// Attaches a group name.
    #[inline]
    pub fn with_group(mut self, name: impl Into<Arc<str>>) -> Self {
        self.group = Some(name.into());
        self
    }

    /// Attaches a pid.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Backoff delay as a `Duration`.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
