//! Dependency graph scheduling
//!
//! Orders a set of named nodes into execution waves: every node in wave `k`
//! has all of its predecessors in waves `0..k`. Waves are computed by
//! iterative predecessor elimination and are deterministic — nodes within a
//! wave are sorted lexicographically.

use crate::error::{PodError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// A directed dependency graph over string-named nodes
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node → set of predecessor names
    predecessors: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no dependencies; idempotent
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.predecessors.entry(name.into()).or_default();
    }

    /// Add an edge `from → to`: `to` depends on `from`
    ///
    /// Both endpoints are created if missing.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        self.predecessors.entry(from.clone()).or_default();
        self.predecessors.entry(to.into()).or_default().insert(from);
    }

    pub fn is_empty(&self) -> bool {
        self.predecessors.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.predecessors.len()
    }

    /// Compute execution waves by iterative predecessor elimination
    ///
    /// Each iteration collects the nodes whose predecessors are all already
    /// completed, sorts them lexicographically, and emits them as the next
    /// wave. An iteration that makes no progress while nodes remain means a
    /// cycle; the error names the remaining nodes.
    pub fn waves(&self) -> Result<Vec<Vec<String>>> {
        let mut completed: BTreeSet<&str> = BTreeSet::new();
        let mut remaining: BTreeSet<&str> =
            self.predecessors.keys().map(String::as_str).collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            // BTreeSet iteration keeps the wave lexicographically sorted
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|name| {
                    self.predecessors[*name]
                        .iter()
                        .all(|dep| completed.contains(dep.as_str()))
                })
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> =
                    remaining.iter().map(|s| s.to_string()).collect();
                return Err(PodError::Cycle(stuck));
            }

            for name in &ready {
                remaining.remove(*name);
                completed.insert(*name);
            }
            waves.push(ready.into_iter().map(String::from).collect());
        }

        Ok(waves)
    }

    /// Build a graph from selected node names and an optional pre-partitioned
    /// wave list: every node in a wave depends on all nodes of the previous
    /// wave. Wave entries not present in `selected` are dropped.
    pub fn from_waves(selected: &[String], waves: Option<&[Vec<String>]>) -> Self {
        let mut graph = Self::new();
        for name in selected {
            graph.add_node(name.clone());
        }

        let Some(waves) = waves else {
            return graph;
        };

        let selected: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        let mut previous: Vec<&str> = Vec::new();
        for wave in waves {
            let members: Vec<&str> = wave
                .iter()
                .map(String::as_str)
                .filter(|name| selected.contains(name))
                .collect();
            if members.is_empty() {
                continue;
            }
            for member in &members {
                for dep in &previous {
                    graph.add_edge(*dep, *member);
                }
            }
            previous = members;
        }
        graph
    }

    /// Build a graph from selected names and a registry of well-known edges,
    /// applying an edge only when both endpoints are selected
    pub fn from_registry(selected: &[String], edges: &[(String, String)]) -> Self {
        let mut graph = Self::new();
        for name in selected {
            graph.add_node(name.clone());
        }
        let names: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        for (from, to) in edges {
            if names.contains(from.as_str()) && names.contains(to.as_str()) {
                graph.add_edge(from.clone(), to.clone());
            }
        }
        graph
    }
}
