//! # Declarative readiness/liveness probe descriptors.
//!
//! A [`ReadyCheck`] says *what* to probe; the [`Prober`](crate::Prober) decides *how*.
//!
//! ## Short form
//! Loaders usually carry probes as one string. [`ReadyCheck::parse`] accepts:
//! ```text
//! ""                         → None (always ready)
//! "2809"                     → TCP localhost:2809
//! "tcp:2809"                 → TCP localhost:2809
//! "tcp:10.0.0.5:4840"        → TCP 10.0.0.5:4840
//! "http://host:8080/health"  → HTTP GET, ready iff 200
//! "file:/run/app.pid"        → file exists and is readable
//! "rpc:SharedMemory"         → object registered in the service directory
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of probe performed by a [`ReadyCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyCheckType {
    /// No probe; immediately satisfied.
    #[default]
    None,
    /// Connect to `host:port` and release the connection.
    Tcp,
    /// Resolve a named object in the service directory and confirm it answers.
    #[serde(alias = "corba")]
    Rpc,
    /// `GET` the target URL; success iff the status is `200 OK`.
    Http,
    /// Path exists and can be opened for reading.
    File,
}

impl ReadyCheckType {
    /// Maps a loader name to a probe kind. Unknown names map to [`ReadyCheckType::None`].
    ///
    /// ```
    /// use procvisor::ReadyCheckType;
    ///
    /// assert_eq!(ReadyCheckType::from_name("corba"), ReadyCheckType::Rpc);
    /// assert_eq!(ReadyCheckType::from_name("TCP"), ReadyCheckType::Tcp);
    /// assert_eq!(ReadyCheckType::from_name("smoke-signal"), ReadyCheckType::None);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "rpc" | "corba" => Self::Rpc,
            "http" | "https" => Self::Http,
            "file" => Self::File,
            _ => Self::None,
        }
    }

    /// Lowercase name, as rendered by `Display`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tcp => "tcp",
            Self::Rpc => "rpc",
            Self::Http => "http",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ReadyCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe descriptor: kind, target and the three timing knobs.
///
/// ## Timing
/// - `timeout`: total budget for [`Prober::wait_for_ready`](crate::Prober::wait_for_ready) (default 10s)
/// - `pause`: sleep between polls (default 1s)
/// - `check_timeout`: bound on a single probe (default 1s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyCheck {
    /// Probe kind.
    #[serde(rename = "type")]
    pub kind: ReadyCheckType,
    /// `host:port`, URL, path or object name depending on `kind`.
    pub target: String,
    /// Total readiness budget.
    #[serde(with = "crate::duration_ms")]
    pub timeout: Duration,
    /// Pause between polls.
    #[serde(with = "crate::duration_ms")]
    pub pause: Duration,
    /// Bound on one probe.
    #[serde(with = "crate::duration_ms")]
    pub check_timeout: Duration,
}

impl Default for ReadyCheck {
    fn default() -> Self {
        Self {
            kind: ReadyCheckType::None,
            target: String::new(),
            timeout: Duration::from_secs(10),
            pause: Duration::from_secs(1),
            check_timeout: Duration::from_secs(1),
        }
    }
}

impl ReadyCheck {
    /// A TCP probe; a bare port gets `localhost:` prepended.
    pub fn tcp(target: impl Into<String>) -> Self {
        Self {
            kind: ReadyCheckType::Tcp,
            target: with_default_host(target.into()),
            ..Self::default()
        }
    }

    /// An HTTP probe for the given URL.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: ReadyCheckType::Http,
            target: url.into(),
            ..Self::default()
        }
    }

    /// A file probe for the given path.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: ReadyCheckType::File,
            target: path.into(),
            ..Self::default()
        }
    }

    /// A service-directory probe for the given object name.
    pub fn rpc(object: impl Into<String>) -> Self {
        Self {
            kind: ReadyCheckType::Rpc,
            target: object.into(),
            ..Self::default()
        }
    }

    /// Sets the total readiness budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between polls.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Sets the single-probe bound.
    #[must_use]
    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    /// True when no probe is configured.
    pub fn is_empty(&self) -> bool {
        self.kind == ReadyCheckType::None
    }

    /// Parses the short `type:target` form (see module docs).
    ///
    /// HTTP(S) targets keep their scheme so they stay absolute URLs.
    ///
    /// ```
    /// use procvisor::{ReadyCheck, ReadyCheckType};
    ///
    /// let c = ReadyCheck::parse("tcp:2809");
    /// assert_eq!(c.kind, ReadyCheckType::Tcp);
    /// assert_eq!(c.target, "localhost:2809");
    ///
    /// let h = ReadyCheck::parse("http://localhost:8080/health");
    /// assert_eq!(h.kind, ReadyCheckType::Http);
    /// assert_eq!(h.target, "http://localhost:8080/health");
    /// ```
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::default();
        }

        let Some((kind, target)) = s.split_once(':') else {
            return Self::tcp(s);
        };

        match ReadyCheckType::from_name(kind) {
            ReadyCheckType::Tcp => Self::tcp(target),
            ReadyCheckType::Http => Self::http(s),
            ReadyCheckType::None => Self::default(),
            other => Self {
                kind: other,
                target: target.to_string(),
                ..Self::default()
            },
        }
    }
}

impl fmt::Display for ReadyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReadyCheckType::None => f.write_str("none"),
            ReadyCheckType::Http => f.write_str(&self.target),
            kind => write!(f, "{kind}:{}", self.target),
        }
    }
}

fn with_default_host(target: String) -> String {
    if target.contains(':') {
        target
    } else {
        format!("localhost:{target}")
    }
}
