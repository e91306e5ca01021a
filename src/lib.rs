//! # procvisor
//!
//! **Procvisor** supervises groups of OS processes on a Linux node.
//!
//! Groups are started in dependency order; each process is launched, gated on a
//! readiness probe, watched for crashes and liveness failures, and restarted with
//! exponential backoff. Stopping walks the reverse order and takes down each
//! process's whole tree. The crate is the core of a launcher: configuration
//! loading and any HTTP control facade sit on top of it.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ProcessGroup │   │ ProcessGroup │   │ ProcessInfo  │ ...
//!     │  (core, 0)   │   │ (apps, 1)    │   │ (db, core)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Registry (model + DependencyResolver, one tokio Mutex)         │
//! │  - Prober (tcp / http / file / rpc ready checks)                  │
//! │  - ProcessControl (signals, /proc tree walk, reaping)             │
//! │  - Bus (broadcast events)                                         │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//!   start_all()        stop_all()       restart/reload     monitor task
//!   (topological)      (reverse)        (per process/all)  (crash + liveness)
//!        │                  │                  │               │
//!        └──────────────────┴─── publish ──────┴───────────────┘
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                    (capacity: Config::bus_capacity)               │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │    listener task       │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                    LogWriter   worker2    workerN
//! ```
//!
//! ### Process lifecycle
//! ```text
//! Stopped ──► Starting ──► spawn ──► ready check ──► hook ──► Running
//!                 ▲                       │                     │
//!                 │                 timeout / exit        crash / liveness
//!                 │                       ▼                     ▼
//!                 └──── sleep(backoff) ◄─ Restarting ◄──── policy allows?
//!                                                               │ no
//!                                                               ▼
//!                                                            Failed
//!                                                  (critical → shutdown requested)
//!
//! oneshot:  Starting ──► exit 0 ──► Completed
//!                    └─► exit ≠ 0 / timeout ──► Failed (not retried)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                            |
//! |-------------------|----------------------------------------------------------------|-----------------------------------------------|
//! | **Model**         | Processes, groups, probes; `serde` ready                       | [`ProcessInfo`], [`ProcessGroup`], [`ReadyCheck`] |
//! | **Ordering**      | Topological group order with cycle detection                   | [`DependencyResolver`]                        |
//! | **Supervision**   | Start/stop/restart/reload, monitor loop                        | [`Supervisor`], [`SupervisorBuilder`]         |
//! | **Probes**        | Readiness and liveness checks                                  | [`Prober`], [`ServiceDirectory`]              |
//! | **Policies**      | Retry budget and backoff                                       | [`RestartPolicy`], [`BackoffPolicy`]          |
//! | **OS layer**      | Signals, process trees, reaping                                | [`ProcessControl`], [`UnixProcessControl`]    |
//! | **Subscriber API**| Lifecycle events for logging, metrics, UIs                     | [`Subscribe`], [`Event`], [`EventKind`]       |
//! | **Errors**        | Typed errors for setup, ordering, and process operations       | [`SetupError`], [`ResolveError`], [`ProcessError`] |
//! | **Configuration** | Supervisor-level policy                                        | [`Config`]                                    |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber that renders events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use procvisor::{Config, ProcessGroup, ProcessInfo, ReadyCheck, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         node_name: "node1".into(),
//!         ..Config::default()
//!     };
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(procvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(cfg)
//!         .with_subscribers(subs)
//!         .group(ProcessGroup::new("core", 0))
//!         .group(ProcessGroup::new("apps", 1).depends_on("core"))
//!         .process(
//!             ProcessInfo::new("shm", "core", "/usr/bin/shared-memory")
//!                 .with_ready_check(ReadyCheck::tcp("2809")),
//!         )
//!         .process(ProcessInfo::new("gui", "apps", "/usr/bin/gui"))
//!         .build()?;
//!
//!     println!("{}", sup.run_list().await?);
//!     sup.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod duration_ms;
mod error;
mod events;
mod model;
mod os;
mod policies;
mod probe;
mod resolver;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use crate::core::{Supervisor, SupervisorBuilder};
pub use error::{OsError, ProcessError, ResolveError, SetupError};
pub use events::{Bus, Event, EventKind};
pub use model::{ProcessGroup, ProcessInfo, ProcessState, ReadyCheck, ReadyCheckType};
pub use os::{Pid, ProcessControl, StopOutcome, UnixProcessControl, collect_tree, pid_alive, stop_tree};
pub use policies::{BackoffPolicy, RestartPolicy};
pub use probe::{Prober, ServiceDirectory};
pub use resolver::DependencyResolver;
pub use subscribers::{Subscribe, SubscribeFn, SubscriberSet};

// Optional: built-in subscriber rendering events through `tracing`.
// Enabled by default; disable with `--no-default-features`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
