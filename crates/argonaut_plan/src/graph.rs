//! Dependency graph of a compiled DAG template.
//!
//! Used to inspect a generated document: ordering, entry and exit steps,
//! and a Graphviz rendering for review.

use std::fmt::Write as _;

use argonaut_core::{CoreError, CoreResult};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::template::Template;

/// A step in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Step name
    pub id: String,
    /// Readable label
    pub label: String,
    /// Template the step runs
    pub target: String,
    /// Whether the step fans out over a list
    pub fan_out: bool,
    /// Whether the step carries a guard
    pub guarded: bool,
}

impl GraphNode {
    /// Plain node labelled with its id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            target: String::new(),
            fan_out: false,
            guarded: false,
        }
    }
}

/// `to` runs after `from`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Upstream step
    pub from: String,
    /// Downstream step
    pub to: String,
}

impl Edge {
    /// Create an edge
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Steps of one DAG and their ordering constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Steps in insertion order
    pub nodes: IndexMap<String, GraphNode>,
    /// Ordering constraints
    pub edges: Vec<Edge>,
}

impl DependencyGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of a DAG template
    ///
    /// # Errors
    ///
    /// Returns a validation error if the template is not a DAG, names an
    /// unknown dependency or is cyclic
    pub fn from_template(template: &Template) -> CoreResult<Self> {
        let dag = template.dag().ok_or_else(|| CoreError::Validation {
            field: template.name.clone(),
            reason: "template is not a DAG".to_string(),
        })?;

        let mut graph = Self::new();
        for task in &dag.tasks {
            graph.add_node(GraphNode {
                id: task.name.clone(),
                label: if task.label.is_empty() {
                    task.name.clone()
                } else {
                    task.label.clone()
                },
                target: task.target(),
                fan_out: task.with_param.is_some(),
                guarded: task.when.is_some(),
            })?;
        }
        for task in &dag.tasks {
            for dependency in &task.dependencies {
                graph.add_edge(Edge::new(dependency.clone(), task.name.clone()))?;
            }
        }
        Ok(graph)
    }

    /// Add a step
    ///
    /// # Errors
    ///
    /// Returns error if a step with the same id exists
    pub fn add_node(&mut self, node: GraphNode) -> CoreResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::Validation {
                field: node.id.clone(),
                reason: "step already exists".to_string(),
            });
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add an ordering constraint
    ///
    /// # Errors
    ///
    /// Returns error if either end is unknown or the edge would close a
    /// cycle
    pub fn add_edge(&mut self, edge: Edge) -> CoreResult<()> {
        for end in [&edge.from, &edge.to] {
            if !self.nodes.contains_key(end) {
                return Err(CoreError::Validation {
                    field: end.clone(),
                    reason: "unknown step".to_string(),
                });
            }
        }
        if self.would_create_cycle(&edge) {
            return Err(CoreError::Validation {
                field: "edge".to_string(),
                reason: format!("{} -> {} would create a cycle", edge.from, edge.to),
            });
        }
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    /// `from -> to` closes a cycle iff `from` is reachable from `to`
    fn would_create_cycle(&self, edge: &Edge) -> bool {
        let mut visited = IndexSet::new();
        let mut stack = vec![edge.to.as_str()];
        while let Some(current) = stack.pop() {
            if current == edge.from {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.edges.iter().filter(|e| e.from == current).map(|e| e.to.as_str()));
        }
        false
    }

    /// Check that every edge joins known steps and the graph is acyclic
    ///
    /// # Errors
    ///
    /// Returns error describing the first problem
    pub fn validate(&self) -> CoreResult<()> {
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(end) {
                    return Err(CoreError::Validation {
                        field: end.clone(),
                        reason: "unknown step".to_string(),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Steps that run after `id`
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Steps `id` waits for
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// Steps without dependencies
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.nodes
            .keys()
            .filter(|id| self.dependencies(id).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Steps nothing depends on
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<&str> {
        self.nodes
            .keys()
            .filter(|id| self.dependents(id).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Steps ordered so every step follows its dependencies
    ///
    /// Ties are broken by insertion order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns a validation error listing the steps left on a cycle
    pub fn topological_order(&self) -> CoreResult<Vec<&str>> {
        let mut remaining: IndexMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), self.dependencies(id).len()))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                let stuck: Vec<&str> = remaining.keys().copied().collect();
                return Err(CoreError::Validation {
                    field: "dag".to_string(),
                    reason: format!("cycle among {}", stuck.join(", ")),
                });
            }
            for id in ready {
                remaining.shift_remove(id);
                for dependent in self.dependents(id) {
                    if let Some(pending) = remaining.get_mut(dependent) {
                        *pending = pending.saturating_sub(1);
                    }
                }
                order.push(id);
            }
        }
        Ok(order)
    }

    /// Number of steps
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render as Graphviz `dot`
    ///
    /// Fan-out steps are drawn as stacked boxes, guarded steps dashed.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n  rankdir=LR;\n");
        for node in self.nodes.values() {
            let shape = if node.fan_out { "box3d" } else { "box" };
            let style = if node.guarded { ", style=dashed" } else { "" };
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\\n{}\", shape={}{}];",
                escape(&node.id),
                escape(&node.label),
                escape(&node.target),
                shape,
                style
            );
        }
        for edge in &self.edges {
            let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&edge.from), escape(&edge.to));
        }
        out.push_str("}\n");
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
