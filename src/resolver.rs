//! # Group dependency resolver.
//!
//! [`DependencyResolver`] is a small directed graph over group names. Edges point from a
//! dependency to its dependent; [`resolve`](DependencyResolver::resolve) yields an order in
//! which every group follows all groups it depends on.
//!
//! ## Algorithm
//! ```text
//! validate: every declared dependency is a registered group   (MissingDependency)
//! for each group in insertion order:
//!     dfs(group):
//!         mark Gray, push on path
//!         for dep in depends (sorted):
//!             Gray  → Cycle(path from dep .. group, dep)
//!             White → dfs(dep)
//!         mark Black, pop, emit group                       (post-order)
//! ```
//! Ties between independent groups keep insertion order, so the result is deterministic.
//! `O(V + E)`; no I/O.

use std::collections::{BTreeSet, HashMap};

use crate::error::ResolveError;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    depends: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Topological sorter for process groups.
///
/// # Example
/// ```
/// use procvisor::DependencyResolver;
///
/// let mut r = DependencyResolver::new();
/// r.add_group("naming", Vec::<String>::new());
/// r.add_group("core", ["naming"]);
/// r.add_group("io", ["core"]);
///
/// assert_eq!(r.resolve().unwrap(), ["naming", "core", "io"]);
/// assert_eq!(r.resolve_reverse().unwrap(), ["io", "core", "naming"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl DependencyResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with the given dependencies, replacing any previous edge set.
    pub fn add_group<I, S>(&mut self, name: impl Into<String>, depends: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let depends: BTreeSet<String> = depends.into_iter().map(Into::into).collect();
        let idx = self.slot(name.into());
        self.nodes[idx].depends = depends;
    }

    /// Adds one edge; registers `group` if it is unknown.
    pub fn add_dependency(&mut self, group: impl Into<String>, depends_on: impl Into<String>) {
        let idx = self.slot(group.into());
        self.nodes[idx].depends.insert(depends_on.into());
    }

    /// True if `name` was registered.
    pub fn has_group(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared dependencies of `name` (empty for unknown groups).
    pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
        self.index
            .get(name)
            .map(|&i| self.nodes[i].depends.clone())
            .unwrap_or_default()
    }

    /// Removes every group.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }

    /// Number of registered groups.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no group is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Start order: every group appears after all of its dependencies.
    ///
    /// # Errors
    /// - [`ResolveError::MissingDependency`] if an edge names an unregistered group;
    /// - [`ResolveError::Cycle`] if the graph is cyclic.
    pub fn resolve(&self) -> Result<Vec<String>, ResolveError> {
        for node in &self.nodes {
            if let Some(dep) = node.depends.iter().find(|d| !self.index.contains_key(*d)) {
                return Err(ResolveError::MissingDependency {
                    group: node.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut path = Vec::new();
        let mut out = Vec::with_capacity(self.nodes.len());

        for i in 0..self.nodes.len() {
            if marks[i] == Mark::White {
                self.visit(i, &mut marks, &mut path, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Exact reverse of [`resolve`](Self::resolve); used for shutdown.
    pub fn resolve_reverse(&self) -> Result<Vec<String>, ResolveError> {
        let mut order = self.resolve()?;
        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        i: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        out: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        marks[i] = Mark::Gray;
        path.push(i);

        for dep in &self.nodes[i].depends {
            // Presence was validated in `resolve`.
            let Some(&j) = self.index.get(dep) else {
                continue;
            };
            match marks[j] {
                Mark::Gray => {
                    let start = path.iter().position(|&p| p == j).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|&p| self.nodes[p].name.clone()).collect();
                    cycle.push(self.nodes[j].name.clone());
                    return Err(ResolveError::Cycle { path: cycle });
                }
                Mark::White => self.visit(j, marks, path, out)?,
                Mark::Black => {}
            }
        }

        path.pop();
        marks[i] = Mark::Black;
        out.push(self.nodes[i].name.clone());
        Ok(())
    }

    fn slot(&mut self, name: String) -> usize {
        if let Some(&i) = self.index.get(&name) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(name.clone(), i);
        self.nodes.push(Node {
            name,
            depends: BTreeSet::new(),
        });
        i
    }
}
