//! Node status tracking and readiness computation
//!
//! The scheduler owns per-node [`NodeStatus`] and per-feedback-edge
//! cycle counts. It never inspects topology beyond direct dependencies:
//! the validator has already guaranteed the graph is well-formed, and
//! the executor decides what actually runs.
//!
//! Status machine: `pending → running → {completed, failed}`, with
//! `skipped` reachable directly from `pending`. The sole exception to
//! forward progress is [`Scheduler::reset_node_for_cycle`], which
//! returns a terminal node to `pending` so a feedback edge can run it
//! again.

use crate::graph::{NodeId, SwarmGraph};
use crate::error::{Result, SwarmError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Lifecycle state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not yet scheduled
    Pending,
    /// Picked for the current batch, not yet running
    Ready,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Will never run (failed dependency or unselected route)
    Skipped,
}

impl NodeStatus {
    /// True for `completed`, `failed`, and `skipped`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Tracks node statuses and feedback-edge cycle counts for one run
#[derive(Debug)]
pub struct Scheduler {
    status: HashMap<NodeId, NodeStatus>,
    cycle_counts: HashMap<(NodeId, NodeId), u32>,
    max_concurrent: Option<usize>,
}

impl Scheduler {
    /// Create a scheduler with every graph node pending
    pub fn from_graph(graph: &SwarmGraph, max_concurrent: Option<usize>) -> Self {
        let status = graph
            .node_ids()
            .into_iter()
            .map(|id| (id, NodeStatus::Pending))
            .collect();
        Self {
            status,
            cycle_counts: HashMap::new(),
            max_concurrent,
        }
    }

    /// Introduce a new pending node (dynamic expansion)
    pub fn register_node(&mut self, id: impl Into<NodeId>) -> Result<()> {
        let id = id.into();
        if self.status.contains_key(&id) {
            return Err(SwarmError::Configuration(format!(
                "node '{}' is already registered",
                id
            )));
        }
        debug!(node = %id, "registering dynamic node");
        self.status.insert(id, NodeStatus::Pending);
        Ok(())
    }

    /// Current status of a node
    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.status.get(id).copied()
    }

    /// Pending nodes whose every regular incoming edge originates from
    /// a completed node, capped by free concurrency slots
    ///
    /// Returns ids in sorted order. A pending node gated by a failed or
    /// skipped dependency is not ready; the executor resolves it into
    /// `skipped`. Returns empty when no slots are free.
    pub fn ready_nodes(&self, graph: &SwarmGraph) -> Vec<NodeId> {
        let slots = match self.max_concurrent {
            Some(cap) => cap.saturating_sub(self.running_count()),
            None => usize::MAX,
        };
        if slots == 0 {
            return Vec::new();
        }

        let mut ready: Vec<NodeId> = self
            .status
            .iter()
            .filter(|(_, status)| **status == NodeStatus::Pending)
            .map(|(id, _)| id.clone())
            .filter(|id| {
                graph.incoming_edges(id).iter().all(|edge| {
                    self.status.get(&edge.from) == Some(&NodeStatus::Completed)
                })
            })
            .collect();
        ready.sort();
        ready.truncate(slots);
        ready
    }

    /// Mark a node picked for the current batch
    pub fn mark_ready(&mut self, id: &str) {
        self.transition(id, NodeStatus::Ready);
    }

    /// Mark a node running
    pub fn mark_running(&mut self, id: &str) {
        self.transition(id, NodeStatus::Running);
    }

    /// Mark a node completed
    pub fn mark_completed(&mut self, id: &str) {
        self.transition(id, NodeStatus::Completed);
    }

    /// Mark a node failed
    pub fn mark_failed(&mut self, id: &str) {
        self.transition(id, NodeStatus::Failed);
    }

    /// Skip a pending node; returns false when the node was not pending
    ///
    /// Skips apply only to nodes that never started, which also keeps
    /// cascade sweeps idempotent.
    pub fn mark_skipped(&mut self, id: &str) -> bool {
        match self.status.get_mut(id) {
            Some(status @ NodeStatus::Pending) => {
                *status = NodeStatus::Skipped;
                debug!(node = %id, "node skipped");
                true
            }
            _ => false,
        }
    }

    /// Return a non-pending node to pending so a feedback edge can run
    /// it again
    pub fn reset_node_for_cycle(&mut self, id: &str) {
        if let Some(status) = self.status.get_mut(id) {
            if *status != NodeStatus::Pending {
                debug!(node = %id, from = ?status, "resetting node for cycle");
                *status = NodeStatus::Pending;
            }
        }
    }

    /// Increment the completion count attributed to a feedback edge;
    /// returns the new count
    pub fn increment_cycle_count(&mut self, from: &str, to: &str) -> u32 {
        let count = self
            .cycle_counts
            .entry((from.to_string(), to.to_string()))
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Current count for a feedback edge
    pub fn cycle_count(&self, from: &str, to: &str) -> u32 {
        self.cycle_counts
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// True when every node is in a terminal state
    pub fn is_done(&self) -> bool {
        self.status.values().all(NodeStatus::is_terminal)
    }

    /// Number of nodes currently running
    pub fn running_count(&self) -> usize {
        self.status
            .values()
            .filter(|s| **s == NodeStatus::Running)
            .count()
    }

    /// Number of completed nodes
    pub fn completed_count(&self) -> usize {
        self.status
            .values()
            .filter(|s| **s == NodeStatus::Completed)
            .count()
    }

    /// Ids of completed nodes, sorted
    pub fn completed_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .status
            .iter()
            .filter(|(_, s)| **s == NodeStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of pending nodes, sorted
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .status
            .iter()
            .filter(|(_, s)| **s == NodeStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Total nodes tracked
    pub fn node_count(&self) -> usize {
        self.status.len()
    }

    fn transition(&mut self, id: &str, to: NodeStatus) {
        if let Some(status) = self.status.get_mut(id) {
            debug!(node = %id, from = ?status, to = ?to, "node transition");
            *status = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDescriptor;
    use crate::graph::Node;

    fn agent(id: &str) -> AgentDescriptor {
        AgentDescriptor::new(id, id, "worker", "work")
    }

    fn chain() -> SwarmGraph {
        let mut graph = SwarmGraph::new("chain");
        for id in ["a", "b", "c"] {
            graph.add_node(Node::new(id, agent(id))).unwrap();
        }
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph
    }

    #[test]
    fn test_initial_readiness() {
        let graph = chain();
        let scheduler = Scheduler::from_graph(&graph, None);
        assert_eq!(scheduler.ready_nodes(&graph), vec!["a"]);
        assert!(!scheduler.is_done());
    }

    #[test]
    fn test_dependency_gating() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);

        scheduler.mark_running("a");
        assert!(scheduler.ready_nodes(&graph).is_empty());

        scheduler.mark_completed("a");
        assert_eq!(scheduler.ready_nodes(&graph), vec!["b"]);
    }

    #[test]
    fn test_failed_dependency_blocks() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);
        scheduler.mark_running("a");
        scheduler.mark_failed("a");

        // b is not ready; the executor is responsible for skipping it.
        assert!(scheduler.ready_nodes(&graph).is_empty());
        assert!(!scheduler.is_done());
    }

    #[test]
    fn test_concurrency_cap() {
        let mut graph = SwarmGraph::new("fanout");
        graph.add_node(Node::new("root", agent("root"))).unwrap();
        for id in ["w1", "w2", "w3", "w4"] {
            graph.add_node(Node::new(id, agent(id))).unwrap();
            graph.add_edge("root", id);
        }

        let mut scheduler = Scheduler::from_graph(&graph, Some(2));
        scheduler.mark_running("root");
        scheduler.mark_completed("root");

        // Cap 2, nothing running: two slots.
        assert_eq!(scheduler.ready_nodes(&graph), vec!["w1", "w2"]);

        scheduler.mark_running("w1");
        assert_eq!(scheduler.ready_nodes(&graph), vec!["w2"]);

        scheduler.mark_running("w2");
        assert!(scheduler.ready_nodes(&graph).is_empty());
    }

    #[test]
    fn test_skip_only_from_pending() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);

        assert!(scheduler.mark_skipped("b"));
        assert!(!scheduler.mark_skipped("b"));

        scheduler.mark_running("a");
        scheduler.mark_completed("a");
        assert!(!scheduler.mark_skipped("a"));
        assert_eq!(scheduler.status("a"), Some(NodeStatus::Completed));
    }

    #[test]
    fn test_reset_for_cycle() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);
        scheduler.mark_running("a");
        scheduler.mark_completed("a");

        scheduler.reset_node_for_cycle("a");
        assert_eq!(scheduler.status("a"), Some(NodeStatus::Pending));
        assert_eq!(scheduler.ready_nodes(&graph), vec!["a"]);
    }

    #[test]
    fn test_cycle_counts() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);

        assert_eq!(scheduler.cycle_count("a", "b"), 0);
        assert_eq!(scheduler.increment_cycle_count("a", "b"), 1);
        assert_eq!(scheduler.increment_cycle_count("a", "b"), 2);
        assert_eq!(scheduler.cycle_count("a", "b"), 2);
        assert_eq!(scheduler.cycle_count("b", "c"), 0);
    }

    #[test]
    fn test_register_duplicate_errors() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);
        assert!(scheduler.register_node("d").is_ok());
        assert!(scheduler.register_node("d").is_err());
        assert!(scheduler.register_node("a").is_err());
    }

    #[test]
    fn test_is_done() {
        let graph = chain();
        let mut scheduler = Scheduler::from_graph(&graph, None);
        scheduler.mark_running("a");
        scheduler.mark_completed("a");
        scheduler.mark_skipped("b");
        scheduler.mark_skipped("c");
        assert!(scheduler.is_done());
        assert_eq!(scheduler.completed_nodes(), vec!["a"]);
        assert_eq!(scheduler.completed_count(), 1);
    }
}
