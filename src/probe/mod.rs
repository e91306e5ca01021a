//! # Readiness and liveness probing.
//!
//! [`Prober`] turns a [`ReadyCheck`] into a yes/no answer.
//!
//! ```text
//! check_once(check)                   one probe, bounded by check.check_timeout
//!   None  → true
//!   Tcp   → connect + shutdown
//!   Http  → GET, true iff 200
//!   File  → open for reading
//!   Rpc   → directory.wait_ready(target, check_timeout, pause)
//!
//! wait_for_ready(check, total, stop)  poll check_once every check.pause until true,
//!                                     `total` elapses or `stop` is cancelled
//!   Rpc   → one directory.wait_ready(target, total, pause) call (it polls itself)
//! ```
//!
//! Transport failures are "not ready", never errors.

mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::model::{ReadyCheck, ReadyCheckType};
use crate::os::{Pid, pid_alive};

/// Registry of named service objects used by [`ReadyCheckType::Rpc`] probes.
///
/// Implementations resolve `object` and confirm it answers, polling every `pause`
/// until `timeout` elapses.
#[async_trait]
pub trait ServiceDirectory: Send + Sync + 'static {
    async fn wait_ready(&self, object: &str, timeout: Duration, pause: Duration) -> bool;
}

/// Probe executor. Cheap to clone.
#[derive(Clone, Default)]
pub struct Prober {
    directory: Option<Arc<dyn ServiceDirectory>>,
}

impl Prober {
    /// Prober without a service directory; `Rpc` probes always fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prober resolving `Rpc` probes through `directory`.
    pub fn with_directory(directory: Arc<dyn ServiceDirectory>) -> Self {
        Self {
            directory: Some(directory),
        }
    }

    /// Performs exactly one probe.
    pub async fn check_once(&self, check: &ReadyCheck) -> bool {
        match check.kind {
            ReadyCheckType::None => true,
            ReadyCheckType::Rpc => {
                self.rpc_ready(&check.target, check.check_timeout, check.pause)
                    .await
            }
            _ => timeout(check.check_timeout, self.probe(check))
                .await
                .unwrap_or(false),
        }
    }

    /// Polls until ready, `total` elapses, or `stop` is cancelled.
    pub async fn wait_for_ready(
        &self,
        check: &ReadyCheck,
        total: Duration,
        stop: &CancellationToken,
    ) -> bool {
        match check.kind {
            ReadyCheckType::None => return true,
            ReadyCheckType::Rpc => {
                return tokio::select! {
                    ok = self.rpc_ready(&check.target, total, check.pause) => ok,
                    _ = stop.cancelled() => false,
                };
            }
            _ => {}
        }

        let deadline = Instant::now() + total;
        loop {
            if stop.is_cancelled() {
                return false;
            }
            if self.check_once(check).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let nap = check.pause.min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = sleep(nap) => {}
                _ = stop.cancelled() => return false,
            }
        }
    }

    /// True if the OS still tracks `pid`, it is positive and not a zombie.
    pub fn is_process_alive(pid: Pid) -> bool {
        pid_alive(pid)
    }

    async fn probe(&self, check: &ReadyCheck) -> bool {
        match check.kind {
            ReadyCheckType::Tcp => match TcpStream::connect(check.target.as_str()).await {
                Ok(mut stream) => {
                    let _ = stream.shutdown().await;
                    true
                }
                Err(_) => false,
            },
            ReadyCheckType::Http => match http::parse_target(&check.target) {
                Some(url) => match http::get_status(url, check.check_timeout).await {
                    Ok(status) => status == StatusCode::OK,
                    Err(e) => {
                        tracing::debug!(probe_target = %check.target, error = %e, "http probe failed");
                        false
                    }
                },
                None => {
                    tracing::debug!(probe_target = %check.target, "unsupported http probe target");
                    false
                }
            },
            ReadyCheckType::File => tokio::fs::File::open(&check.target).await.is_ok(),
            ReadyCheckType::None | ReadyCheckType::Rpc => true,
        }
    }

    async fn rpc_ready(&self, object: &str, limit: Duration, pause: Duration) -> bool {
        match &self.directory {
            Some(dir) => dir.wait_ready(object, limit, pause).await,
            None => {
                tracing::debug!(object, "rpc probe without a service directory");
                false
            }
        }
    }
}
