//! # Example: run_list
//!
//! Loads a process model from JSON and prints what `start_all` would launch on a
//! given node, without starting anything.
//!
//! ## Run
//! ```bash
//! cargo run --example run_list -- node2
//! ```

use procvisor::{Config, ProcessGroup, ProcessInfo, Supervisor};
use serde::Deserialize;

#[derive(Deserialize)]
struct Model {
    config: Config,
    groups: Vec<ProcessGroup>,
    processes: Vec<ProcessInfo>,
}

const MODEL: &str = r#"{
    "config": {
        "node_name": "node1",
        "common_args": ["--confile", "project.xml"],
        "forward_args": ["--verbose"]
    },
    "groups": [
        { "name": "base", "order": 0, "processes": ["naming", "shm"] },
        { "name": "apps", "order": 1, "depends": ["base"] }
    ],
    "processes": [
        { "name": "naming", "command": "omniNames", "raw_args": ["-start", "2809"],
          "ready_check": { "type": "tcp", "target": "localhost:2809", "timeout": 15000 } },
        { "name": "shm", "command": "sm-server", "args": ["--size", "64M"],
          "ready_check": { "type": "file", "target": "/tmp/shm.ready" } },
        { "name": "gui", "group": "apps", "command": "project-gui", "node_filter": ["node1"],
          "critical": false },
        { "name": "logger", "group": "apps", "command": "logd", "manual": true },
        { "name": "init-db", "group": "apps", "command": "db-init", "oneshot": true }
    ]
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut model: Model = serde_json::from_str(MODEL)?;
    if let Some(node) = std::env::args().nth(1) {
        model.config.node_name = node;
    }

    let sup = Supervisor::builder(model.config)
        .groups(model.groups)
        .processes(model.processes)
        .build()?;

    print!("{}", sup.run_list().await?);
    Ok(())
}
