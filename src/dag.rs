//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::errors::{Result, ZyError};
use crate::orbit::plugin::ZyPluginPriority;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZyNodeId(pub String);

impl fmt::Display for ZyNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ZyNodeId {
    fn from(s: &str) -> Self {
        ZyNodeId(s.to_string())
    }
}

impl From<String> for ZyNodeId {
    fn from(s: String) -> Self {
        ZyNodeId(s)
    }
}

#[derive(Clone, Debug)]
pub struct ZyGraphNode {
    pub id: ZyNodeId,
    pub priority: ZyPluginPriority,
    /// Insertion sequence, the stable tiebreak between equal priorities.
    pub sequence: usize,
    pub dependencies: Vec<ZyNodeId>,
}

impl ZyGraphNode {
    pub fn new(id: impl Into<ZyNodeId>, priority: ZyPluginPriority, sequence: usize) -> Self {
        Self {
            id: id.into(),
            priority,
            sequence,
            dependencies: Vec::new(),
        }
    }

    pub fn add_dependency(&mut self, dep: impl Into<ZyNodeId>) {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }
}

/// Result of ordering a dependency graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZyOrdering {
    /// Every node, dependencies first, then by priority and sequence.
    pub order: Vec<ZyNodeId>,
    /// Nodes that sit on (or behind) a dependency cycle. They are appended to
    /// `order` by priority so the ordering always terminates.
    pub cyclic: Vec<ZyNodeId>,
}

/// Dependency graph between plugins. Edges point from a plugin to the
/// plugins it requires; edges to unknown nodes are ignored.
#[derive(Clone, Debug, Default)]
pub struct ZyDependencyGraph {
    nodes: HashMap<ZyNodeId, ZyGraphNode>,
}

impl ZyDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: ZyGraphNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(ZyError::validation(format!(
                "node '{}' already exists",
                node.id
            )));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rank used to pick among ready nodes: higher priority first, then
    /// earlier registration.
    fn rank(node: &ZyGraphNode) -> (std::cmp::Reverse<ZyPluginPriority>, usize) {
        (std::cmp::Reverse(node.priority), node.sequence)
    }

    /// Kahn's algorithm where the ready set is drained in rank order, so a
    /// node never precedes one of its dependencies and priority decides
    /// everything else.
    pub fn ordered(&self) -> ZyOrdering {
        let mut pending: HashMap<&ZyNodeId, usize> = HashMap::new();
        let mut dependents: HashMap<&ZyNodeId, Vec<&ZyNodeId>> = HashMap::new();

        for node in self.nodes.values() {
            let known: Vec<&ZyNodeId> = node
                .dependencies
                .iter()
                .filter(|dep| self.nodes.contains_key(*dep) && **dep != node.id)
                .collect();
            pending.insert(&node.id, known.len());
            for dep in known {
                dependents.entry(dep).or_default().push(&node.id);
            }
        }

        let mut ready: BTreeSet<(std::cmp::Reverse<ZyPluginPriority>, usize, &ZyNodeId)> = self
            .nodes
            .values()
            .filter(|n| pending.get(&n.id).copied() == Some(0))
            .map(|n| {
                let (p, s) = Self::rank(n);
                (p, s, &n.id)
            })
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(first) = ready.iter().next().cloned() {
            ready.remove(&first);
            let (_, _, id) = first;
            order.push(id.clone());

            if let Some(children) = dependents.get(id) {
                for child in children {
                    if let Some(count) = pending.get_mut(*child) {
                        *count -= 1;
                        if *count == 0 {
                            if let Some(node) = self.nodes.get(*child) {
                                let (p, s) = Self::rank(node);
                                ready.insert((p, s, &node.id));
                            }
                        }
                    }
                }
            }
        }

        let mut cyclic: Vec<&ZyGraphNode> = self
            .nodes
            .values()
            .filter(|n| pending.get(&n.id).copied().unwrap_or(0) > 0)
            .collect();
        cyclic.sort_by_key(|n| Self::rank(n));
        let cyclic: Vec<ZyNodeId> = cyclic.into_iter().map(|n| n.id.clone()).collect();
        order.extend(cyclic.iter().cloned());

        ZyOrdering { order, cyclic }
    }

    /// Strict topological sort; fails when a cycle exists.
    pub fn topological_sort(&self) -> Result<Vec<ZyNodeId>> {
        let ordering = self.ordered();
        if !ordering.cyclic.is_empty() {
            return Err(ZyError::validation(format!(
                "cycle detected involving nodes: {:?}",
                ordering.cyclic
            )));
        }
        Ok(ordering.order)
    }

    pub fn detect_cycles(&self) -> bool {
        !self.ordered().cyclic.is_empty()
    }
}
