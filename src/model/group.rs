use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A named set of processes started together.
///
/// `order` is only a display/tie-break hint; start order comes from `depends`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessGroup {
    /// Unique group name.
    pub name: String,
    /// Display and tie-break hint.
    pub order: i32,
    /// Groups that must be ready before this one starts.
    pub depends: BTreeSet<String>,
    /// Member process names, in start order.
    pub processes: Vec<String>,
}

impl ProcessGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            name: name.into(),
            order,
            ..Self::default()
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, group: impl Into<String>) -> Self {
        self.depends.insert(group.into());
        self
    }

    /// Appends a member process.
    #[must_use]
    pub fn with_process(mut self, name: impl Into<String>) -> Self {
        self.processes.push(name.into());
        self
    }
}
