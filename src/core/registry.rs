//! # Process registry: the model guarded by the supervisor lock.
//!
//! Holds every [`ProcessInfo`] and [`ProcessGroup`] plus the [`DependencyResolver`]
//! built from the groups. The registry itself never blocks; the supervisor locks it,
//! copies what it needs, and releases it before any spawn, probe, or wait.
//!
//! ## Claims
//! ```text
//! claim(name)   → Driver { name, generation: n+1 }   (invalidates every older driver)
//! owned(driver) → &mut ProcessInfo                    (entry still there, generation unchanged)
//!               → Err(Vanished)                       (entry removed)
//!               → Err(Superseded)                     (someone claimed it since)
//! ```
//!
//! Only the holder of the newest claim writes terminal fields, so a process's own
//! transitions stay linear even when stop/restart/monitor race each other.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ProcessError, ResolveError, SetupError};
use crate::model::{ProcessGroup, ProcessInfo};
use crate::resolver::DependencyResolver;

struct Entry {
    info: ProcessInfo,
    generation: u64,
}

/// Right to drive one process until someone else claims it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Driver {
    pub name: String,
    pub generation: u64,
}

/// Group name with its member process names, in launch order.
pub(crate) type Plan = Vec<(String, Vec<String>)>;

pub(crate) struct Registry {
    entries: BTreeMap<String, Entry>,
    groups: Vec<ProcessGroup>,
    resolver: DependencyResolver,
}

impl Registry {
    /// Validates and indexes the model.
    ///
    /// Groups are registered by ascending `order` (stable), which is the tie-break the
    /// resolver uses between independent groups. A process may name its group either
    /// through `ProcessInfo::group` or by being listed in `ProcessGroup::processes`.
    pub fn new(groups: Vec<ProcessGroup>, processes: Vec<ProcessInfo>) -> Result<Self, SetupError> {
        let mut entries = BTreeMap::new();
        for info in processes {
            let name = info.name.clone();
            if entries.insert(name.clone(), Entry { info, generation: 0 }).is_some() {
                return Err(SetupError::DuplicateProcess(name));
            }
        }

        let mut merged: Vec<ProcessGroup> = Vec::new();
        for group in groups {
            match merged.iter_mut().find(|g| g.name == group.name) {
                Some(existing) => {
                    existing.depends.extend(group.depends);
                    existing.processes.extend(group.processes);
                }
                None => merged.push(group),
            }
        }
        merged.sort_by_key(|g| g.order);

        let mut owner: HashMap<String, String> = HashMap::new();
        for group in &merged {
            for process in &group.processes {
                let Some(entry) = entries.get_mut(process) else {
                    return Err(SetupError::UnknownProcess {
                        group: group.name.clone(),
                        process: process.clone(),
                    });
                };
                if let Some(first) = owner.get(process) {
                    return Err(SetupError::DuplicateMembership {
                        process: process.clone(),
                        first: first.clone(),
                        second: group.name.clone(),
                    });
                }
                if entry.info.group.is_empty() {
                    entry.info.group = group.name.clone();
                } else if entry.info.group != group.name {
                    return Err(SetupError::DuplicateMembership {
                        process: process.clone(),
                        first: entry.info.group.clone(),
                        second: group.name.clone(),
                    });
                }
                owner.insert(process.clone(), group.name.clone());
            }
        }

        // Processes that only name their group join the end of its list.
        for entry in entries.values() {
            if owner.contains_key(&entry.info.name) {
                continue;
            }
            let Some(group) = merged.iter_mut().find(|g| g.name == entry.info.group) else {
                return Err(SetupError::UnknownGroup {
                    process: entry.info.name.clone(),
                    group: entry.info.group.clone(),
                });
            };
            group.processes.push(entry.info.name.clone());
        }

        let mut resolver = DependencyResolver::new();
        for group in &merged {
            resolver.add_group(group.name.clone(), group.depends.iter().cloned());
        }

        Ok(Self {
            entries,
            groups: merged,
            resolver,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ProcessInfo> {
        self.entries.get(name).map(|e| &e.info)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessInfo> {
        self.entries.get_mut(name).map(|e| &mut e.info)
    }

    /// Takes over `name`, invalidating every earlier [`Driver`].
    pub fn claim(&mut self, name: &str) -> Result<Driver, ProcessError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ProcessError::NotFound { name: name.to_string() })?;
        entry.generation += 1;
        Ok(Driver {
            name: name.to_string(),
            generation: entry.generation,
        })
    }

    /// Re-resolves the process behind `driver`.
    pub fn owned(&mut self, driver: &Driver) -> Result<&mut ProcessInfo, ProcessError> {
        match self.entries.get_mut(&driver.name) {
            None => Err(ProcessError::Vanished {
                name: driver.name.clone(),
            }),
            Some(e) if e.generation != driver.generation => Err(ProcessError::Superseded {
                name: driver.name.clone(),
            }),
            Some(e) => Ok(&mut e.info),
        }
    }

    /// Removes a process from the model. Drivers still holding it see `Vanished`.
    pub fn remove(&mut self, name: &str) -> Option<ProcessInfo> {
        let entry = self.entries.remove(name)?;
        for group in &mut self.groups {
            group.processes.retain(|p| p != name);
        }
        Some(entry.info)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.entries.values().map(|e| &e.info)
    }

    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    pub fn groups(&self) -> Vec<ProcessGroup> {
        self.groups.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn infos_mut(&mut self) -> impl Iterator<Item = &mut ProcessInfo> {
        self.entries.values_mut().map(|e| &mut e.info)
    }

    /// Groups in dependency order with their processes in list order.
    pub fn start_plan(&self) -> Result<Plan, ResolveError> {
        let order = self.resolver.resolve()?;
        Ok(self.expand(order, false))
    }

    /// Exact reverse of [`start_plan`](Self::start_plan), members reversed too.
    pub fn stop_plan(&self) -> Result<Plan, ResolveError> {
        let order = self.resolver.resolve_reverse()?;
        Ok(self.expand(order, true))
    }

    fn expand(&self, order: Vec<String>, reverse_members: bool) -> Plan {
        order
            .into_iter()
            .filter_map(|name| {
                let group = self.groups.iter().find(|g| g.name == name)?;
                let mut members: Vec<String> = group
                    .processes
                    .iter()
                    .filter(|p| self.entries.contains_key(*p))
                    .cloned()
                    .collect();
                if reverse_members {
                    members.reverse();
                }
                Some((name, members))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(name: &str, group: &str) -> ProcessInfo {
        ProcessInfo::new(name, group, "/bin/true")
    }

    fn sample() -> Registry {
        Registry::new(
            vec![
                ProcessGroup::new("apps", 1).depends_on("core").with_process("web"),
                ProcessGroup::new("core", 0).with_process("db").with_process("cache"),
            ],
            vec![proc("web", ""), proc("db", "core"), proc("cache", ""), proc("worker", "apps")],
        )
        .unwrap()
    }

    #[test]
    fn plans_follow_dependencies_and_list_order() {
        let reg = sample();
        assert_eq!(
            reg.start_plan().unwrap(),
            vec![
                ("core".to_string(), vec!["db".to_string(), "cache".to_string()]),
                ("apps".to_string(), vec!["web".to_string(), "worker".to_string()]),
            ]
        );
        assert_eq!(
            reg.stop_plan().unwrap(),
            vec![
                ("apps".to_string(), vec!["worker".to_string(), "web".to_string()]),
                ("core".to_string(), vec!["cache".to_string(), "db".to_string()]),
            ]
        );
        assert_eq!(reg.get("web").unwrap().group, "apps");
    }

    #[test]
    fn validation_rejects_inconsistent_models() {
        let dup = Registry::new(vec![], vec![proc("a", "g"), proc("a", "g")]);
        assert!(matches!(dup, Err(SetupError::DuplicateProcess(n)) if n == "a"));

        let unknown_group = Registry::new(vec![], vec![proc("a", "nowhere")]);
        assert!(matches!(unknown_group, Err(SetupError::UnknownGroup { .. })));

        let unknown_proc = Registry::new(vec![ProcessGroup::new("g", 0).with_process("ghost")], vec![]);
        assert!(matches!(unknown_proc, Err(SetupError::UnknownProcess { .. })));

        let twice = Registry::new(
            vec![
                ProcessGroup::new("g1", 0).with_process("a"),
                ProcessGroup::new("g2", 1).with_process("a"),
            ],
            vec![proc("a", "")],
        );
        assert!(matches!(twice, Err(SetupError::DuplicateMembership { .. })));
    }

    #[test]
    fn newer_claim_supersedes_older_driver() {
        let mut reg = sample();
        let first = reg.claim("db").unwrap();
        assert!(reg.owned(&first).is_ok());

        let second = reg.claim("db").unwrap();
        assert!(matches!(reg.owned(&first), Err(ProcessError::Superseded { .. })));
        assert!(reg.owned(&second).is_ok());

        reg.remove("db");
        assert!(matches!(reg.owned(&second), Err(ProcessError::Vanished { .. })));
        assert!(matches!(reg.claim("db"), Err(ProcessError::NotFound { .. })));
        assert_eq!(reg.start_plan().unwrap()[0].1, vec!["cache".to_string()]);
    }

    #[test]
    fn missing_dependency_surfaces_at_plan_time() {
        let reg = Registry::new(
            vec![ProcessGroup::new("apps", 0).depends_on("core")],
            vec![],
        )
        .unwrap();
        assert!(matches!(
            reg.start_plan(),
            Err(ResolveError::MissingDependency { .. })
        ));
    }
}
