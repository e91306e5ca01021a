//! Process/group data model.
//!
//! - [`ProcessInfo`] / [`ProcessState`] per-process configuration and runtime state
//! - [`ProcessGroup`] named, dependency-ordered set of processes
//! - [`ReadyCheck`] / [`ReadyCheckType`] probe descriptors
//!
//! Records are plain data with `serde` derives so an external loader (XML, TOML, JSON)
//! can build them; nothing in this module performs I/O.

mod group;
mod process;
mod ready_check;

pub use group::ProcessGroup;
pub use process::{ProcessInfo, ProcessState};
pub use ready_check::{ReadyCheck, ReadyCheckType};
