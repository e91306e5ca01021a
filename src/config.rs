//! # Supervisor-level configuration.
//!
//! [`Config`] carries the policy that applies to every process: the node this
//! supervisor runs on, monitor cadence, restart window, stop timeouts and the
//! argument lists added to every launch.
//!
//! ## Sentinel values
//! - `restart_window = 0s` → restart counters never reset by elapsed time
//! - `health_check_interval = 0s` → monitor ticks at the minimum interval (10ms)
//! - `bus_capacity = 0` → clamped to 1
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use procvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.node_name = "node1".into();
//! cfg.stop_timeout = Duration::from_secs(2);
//! cfg.common_args = vec!["--confile".into(), "project.xml".into()];
//!
//! assert_eq!(cfg.health_check_interval, Duration::from_secs(5));
//! assert_eq!(cfg.restart_window_limit(), Some(Duration::from_secs(60)));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(10);

/// Global configuration for the supervisor.
///
/// All fields are public; prefer the accessors over sprinkling sentinel checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of this node, matched against each process's `node_filter`.
    pub node_name: String,

    /// Monitor loop period (liveness and crash detection).
    #[serde(with = "crate::duration_ms")]
    pub health_check_interval: Duration,

    /// A failure more than this long after the last launch starts a fresh retry streak.
    #[serde(with = "crate::duration_ms")]
    pub restart_window: Duration,

    /// How long to wait after SIGTERM before escalating to SIGKILL.
    #[serde(with = "crate::duration_ms")]
    pub stop_timeout: Duration,

    /// How long to wait after SIGKILL before giving up on the tree.
    #[serde(with = "crate::duration_ms")]
    pub kill_timeout: Duration,

    /// Arguments prepended to every process's `args` (ignored when `raw_args` is set).
    pub common_args: Vec<String>,

    /// Arguments appended to every launch.
    pub forward_args: Vec<String>,

    /// Raw string appended as one final argument (empty = none).
    pub passthrough_args: String,

    /// Capacity of the event bus ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Monitor period, clamped to a 10ms floor.
    #[inline]
    pub fn monitor_interval(&self) -> Duration {
        self.health_check_interval.max(MIN_MONITOR_INTERVAL)
    }

    /// Restart window as an `Option` (`None` = never reset by time).
    #[inline]
    pub fn restart_window_limit(&self) -> Option<Duration> {
        if self.restart_window.is_zero() {
            None
        } else {
            Some(self.restart_window)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// - `node_name = ""`
    /// - `health_check_interval = 5s`
    /// - `restart_window = 60s`
    /// - `stop_timeout = 5s`
    /// - `kill_timeout = 1s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            node_name: String::new(),
            health_check_interval: Duration::from_secs(5),
            restart_window: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(1),
            common_args: Vec::new(),
            forward_args: Vec::new(),
            passthrough_args: String::new(),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        let cfg = Config {
            health_check_interval: Duration::ZERO,
            restart_window: Duration::ZERO,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.monitor_interval(), Duration::from_millis(10));
        assert_eq!(cfg.restart_window_limit(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn loads_from_json_with_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"node_name":"n1","stop_timeout":250}"#).unwrap();
        assert_eq!(cfg.node_name, "n1");
        assert_eq!(cfg.stop_timeout, Duration::from_millis(250));
        assert_eq!(cfg.restart_window, Duration::from_secs(60));
    }
}
