use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::registry::Registry;
use super::supervisor::Supervisor;
use crate::{
    config::Config,
    error::SetupError,
    events::Bus,
    model::{ProcessGroup, ProcessInfo},
    os::{ProcessControl, UnixProcessControl},
    probe::{Prober, ServiceDirectory},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`] from a process/group model.
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    groups: Vec<ProcessGroup>,
    processes: Vec<ProcessInfo>,
    directory: Option<Arc<dyn ServiceDirectory>>,
    control: Option<Arc<dyn ProcessControl>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            groups: Vec::new(),
            processes: Vec::new(),
            directory: None,
            control: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Service directory used by `Rpc` ready checks.
    pub fn with_directory(mut self, directory: Arc<dyn ServiceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Replaces the OS process layer (defaults to [`UnixProcessControl`]).
    pub fn with_process_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Adds a group.
    pub fn group(mut self, group: ProcessGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Adds several groups.
    pub fn groups(mut self, groups: impl IntoIterator<Item = ProcessGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Adds a process.
    pub fn process(mut self, process: ProcessInfo) -> Self {
        self.processes.push(process);
        self
    }

    /// Adds several processes.
    pub fn processes(mut self, processes: impl IntoIterator<Item = ProcessInfo>) -> Self {
        self.processes.extend(processes);
        self
    }

    /// Validates the model and returns the Supervisor.
    ///
    /// Must be called inside a tokio runtime: it spawns the subscriber workers and the
    /// bus listener that feeds them.
    pub fn build(self) -> Result<Arc<Supervisor>, SetupError> {
        let registry = Registry::new(self.groups, self.processes)?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let prober = match self.directory {
            Some(dir) => Prober::with_directory(dir),
            None => Prober::new(),
        };
        let control = self
            .control
            .unwrap_or_else(|| Arc::new(UnixProcessControl::new()));

        let listener = CancellationToken::new();
        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            spawn_listener(&bus, subs, listener.clone());
        }

        Ok(Arc::new(Supervisor::new_internal(
            self.cfg, bus, prober, control, registry, listener,
        )))
    }
}

/// Forwards bus events to the subscriber set until `token` is cancelled.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        subs.shutdown().await;
    });
}
