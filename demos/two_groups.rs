//! # Example: two_groups
//!
//! Two dependent groups of shell processes, supervised until Ctrl-C.
//!
//! - `core` holds a "database" that becomes ready once it has written a marker file.
//! - `apps` depends on `core`; its `worker` crashes every few seconds and is
//!   brought back by the monitor with backoff.
//! - A `migrate` oneshot in `apps` runs to completion once.
//!
//! ## Flow
//! ```text
//! start_all()
//!   ├─► GroupStarting(core)
//!   │     └─► db: spawn ─► file probe ─► ProcessStarted
//!   ├─► GroupStarting(apps)
//!   │     ├─► migrate: spawn ─► exit 0 ─► ProcessCompleted
//!   │     └─► worker: spawn ─► ProcessStarted
//! monitor
//!   └─► worker exits ─► ProcessExited ─► BackoffScheduled ─► ProcessStarted
//! Ctrl-C
//!   └─► GroupStopping(apps) ─► GroupStopping(core)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example two_groups
//! ```

use std::{sync::Arc, time::Duration};

use procvisor::{Config, ProcessGroup, ProcessInfo, ReadyCheck, Subscribe, Supervisor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("db.ready");

    let mut cfg = Config::default();
    cfg.node_name = "demo".into();
    cfg.health_check_interval = Duration::from_millis(500);
    cfg.stop_timeout = Duration::from_secs(2);

    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(procvisor::LogWriter::new())];
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    let db = ProcessInfo::new("db", "core", "/bin/sh")
        .with_args(["-c", "sleep 1; touch \"$READY_FILE\"; exec sleep 3600"])
        .with_env("READY_FILE", marker.to_string_lossy())
        .with_ready_check(
            ReadyCheck::file(marker.to_string_lossy())
                .with_timeout(Duration::from_secs(5))
                .with_pause(Duration::from_millis(200)),
        );

    let migrate = ProcessInfo {
        oneshot: true,
        ..ProcessInfo::new("migrate", "apps", "/bin/sh").with_args(["-c", "echo migrating; sleep 1"])
    };

    let worker = ProcessInfo {
        critical: false,
        restart_delay: Duration::from_millis(500),
        max_restart_delay: Duration::from_secs(4),
        ..ProcessInfo::new("worker", "apps", "/bin/sh").with_args(["-c", "sleep 3; exit 1"])
    };

    let sup = Supervisor::builder(cfg)
        .with_subscribers(subs)
        .group(ProcessGroup::new("core", 0))
        .group(ProcessGroup::new("apps", 1).depends_on("core"))
        .processes([db, migrate, worker])
        .build()?;

    println!("{}", sup.run_list().await?);
    sup.run_until_shutdown().await?;
    Ok(())
}
