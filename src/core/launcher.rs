//! # OS process launch.
//!
//! Turns a [`ProcessInfo`] into a [`LaunchSpec`] (argument vector, expanded environment,
//! working directory) and starts it in one of three ways:
//!
//! ```text
//! spawn_daemon   std::process::Command on the blocking pool; reaped later via ProcessControl::reap
//! spawn_oneshot  tokio::process::Command with piped output; awaited by the runner
//! run_hook       sh -c <command> with the same environment (the shell expands it), bounded by a timeout
//! ```
//!
//! Argument vector: `raw_args` (or `common_args` + `args`), then `forward_args`, then
//! `passthrough_args` as one final argument when non-empty.

use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use tokio::process::{Child, Command};

use crate::config::Config;
use crate::error::ProcessError;
use crate::model::ProcessInfo;
use crate::os::Pid;

static ENV_REF: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").ok()
});

/// Everything needed to start one process.
#[derive(Debug, Clone)]
pub(crate) struct LaunchSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(info: &ProcessInfo, cfg: &Config) -> Self {
        Self {
            name: info.name.clone(),
            command: info.command.clone(),
            args: build_args(info, cfg),
            work_dir: info.work_dir.clone(),
            env: info
                .env
                .iter()
                .map(|(k, v)| (k.clone(), expand_env(v)))
                .collect(),
        }
    }

    fn std_command(&self, program: &str) -> StdCommand {
        let mut cmd = StdCommand::new(program);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn launch_error(&self, err: impl ToString) -> ProcessError {
        ProcessError::Launch {
            name: self.name.clone(),
            error: err.to_string(),
        }
    }
}

/// Argument vector a launch of `info` would use.
pub(crate) fn build_args(info: &ProcessInfo, cfg: &Config) -> Vec<String> {
    let mut args = if info.raw_args.is_empty() {
        cfg.common_args
            .iter()
            .chain(info.args.iter())
            .cloned()
            .collect()
    } else {
        info.raw_args.clone()
    };
    args.extend(cfg.forward_args.iter().cloned());
    if !cfg.passthrough_args.is_empty() {
        args.push(cfg.passthrough_args.clone());
    }
    args
}

/// Substitutes `${VAR}` and `$VAR` from the supervisor's environment; unset variables become empty.
pub(crate) fn expand_env(value: &str) -> String {
    expand_with(value, |key| std::env::var(key).ok())
}

fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let Some(re) = ENV_REF.as_ref() else {
        return value.to_string();
    };
    re.replace_all(value, |caps: &Captures| {
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        lookup(key).unwrap_or_default()
    })
    .into_owned()
}

/// Starts a long-running process and returns its pid.
///
/// The child handle is dropped without waiting; its exit status is collected
/// through `ProcessControl::reap`.
pub(crate) async fn spawn_daemon(spec: &LaunchSpec) -> Result<Pid, ProcessError> {
    let mut cmd = spec.std_command(&spec.command);
    cmd.args(&spec.args);

    let spawned = tokio::task::spawn_blocking(move || cmd.spawn())
        .await
        .map_err(|e| spec.launch_error(e))?;
    let child = spawned.map_err(|e| spec.launch_error(e))?;
    Ok(child.id() as Pid)
}

/// Starts a oneshot with captured output.
pub(crate) fn spawn_oneshot(spec: &LaunchSpec) -> Result<Child, ProcessError> {
    let mut std_cmd = spec.std_command(&spec.command);
    std_cmd
        .args(&spec.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    Command::from(std_cmd)
        .spawn()
        .map_err(|e| spec.launch_error(e))
}

/// Runs a post-ready hook through `sh -c`, bounded by `limit`.
pub(crate) async fn run_hook(spec: &LaunchSpec, hook: &str, limit: Duration) -> Result<(), String> {
    let mut std_cmd = spec.std_command("/bin/sh");
    std_cmd.arg("-c").arg(hook);
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.status()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(format!("hook exited with {status}")),
        Ok(Err(e)) => Err(format!("hook failed to start: {e}")),
        Err(_) => Err(format!("hook did not finish within {limit:?}")),
    }
}
