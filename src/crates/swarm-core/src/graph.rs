//! Core graph data structures for swarm runs
//!
//! A swarm graph is a set of agent [`Node`]s wired by regular [`Edge`]s
//! (optionally carrying a cycle bound), plus [`ConditionalEdge`]s whose
//! [`Evaluator`] routes on a completed node's output. Nodes and regular
//! edges are append-only while a run is in progress (coordinators
//! expand the graph through the executor), while conditional edges and
//! the dynamic-expansion set are fixed at construction.
//!
//! # Graph Structure
//!
//! ```text
//!  researcher ──────► writer ──────► reviewer
//!       │                              │ (conditional)
//!       │                       ┌──────┴──────┐
//!       ▼                       ▼             ▼
//!   coordinator*            approver      rejector
//!   (*canEmitDAG: may append nodes/edges at runtime)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use swarm_core::agent::AgentDescriptor;
//! use swarm_core::graph::{Node, SwarmGraph};
//!
//! let mut graph = SwarmGraph::new("review-flow");
//! graph.add_node(Node::new("a", AgentDescriptor::new("a", "A", "writer", "write"))).unwrap();
//! graph.add_node(Node::new("b", AgentDescriptor::new("b", "B", "editor", "edit"))).unwrap();
//! graph.add_edge("a", "b");
//!
//! assert_eq!(graph.root_nodes(), vec!["a".to_string()]);
//! assert_eq!(graph.leaf_nodes(), vec!["b".to_string()]);
//! ```

use crate::agent::AgentDescriptor;
use crate::error::{Result, SwarmError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Node identifier, unique within a graph
pub type NodeId = String;

/// One agent invocation vertex
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node id
    pub id: NodeId,

    /// The agent this node invokes
    pub agent: AgentDescriptor,

    /// Task override; falls back to the swarm-level task when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Marks a coordinator whose output may expand the graph
    #[serde(default, rename = "canEmitDAG")]
    pub can_emit_dag: bool,
}

impl Node {
    /// Create a node invoking `agent`
    pub fn new(id: impl Into<NodeId>, agent: AgentDescriptor) -> Self {
        Self {
            id: id.into(),
            agent,
            task: None,
            can_emit_dag: false,
        }
    }

    /// Override the swarm-level task for this node
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Mark this node as a coordinator
    pub fn coordinator(mut self) -> Self {
        self.can_emit_dag = true;
        self
    }
}

/// A regular edge, optionally a feedback edge
///
/// When `max_cycles` is present the edge permits its target to be
/// re-scheduled: the target may complete up to `max_cycles` times
/// attributable to this edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Cycle bound making this a feedback edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,
}

impl Edge {
    /// Create a plain dependency edge
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            max_cycles: None,
        }
    }

    /// Create a feedback edge bounded by `max_cycles`
    pub fn feedback(from: impl Into<NodeId>, to: impl Into<NodeId>, max_cycles: u32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            max_cycles: Some(max_cycles),
        }
    }
}

/// Routing function attached to a conditional edge
///
/// Evaluators turn a completed node's output into a routing label. The
/// label (or a direct node id) selects one target; unselected targets
/// are skipped.
#[derive(Clone)]
pub enum Evaluator {
    /// Arbitrary routing function over the output text
    Rule(Arc<dyn Fn(&str) -> String + Send + Sync>),

    /// Pattern match: `match_target` when the pattern matches the
    /// output, `else_target` otherwise
    Regex {
        /// Compiled pattern tested against the output
        pattern: Regex,
        /// Label returned on a match
        match_target: String,
        /// Label returned otherwise
        else_target: String,
    },

    /// Ask a model to pick the label
    Llm {
        /// Routing instruction presented with the output
        prompt: String,
        /// Model override
        model: Option<String>,
        /// Provider registry entry; falls back to the default provider
        provider_id: Option<String>,
    },
}

impl Evaluator {
    /// Create a rule evaluator from a routing closure
    pub fn rule(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::Rule(Arc::new(f))
    }

    /// Create a regex evaluator
    pub fn regex(
        pattern: &str,
        match_target: impl Into<String>,
        else_target: impl Into<String>,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| SwarmError::Configuration(format!("invalid evaluator pattern: {}", e)))?;
        Ok(Self::Regex {
            pattern,
            match_target: match_target.into(),
            else_target: else_target.into(),
        })
    }

    /// Create an LLM evaluator
    pub fn llm(prompt: impl Into<String>) -> Self {
        Self::Llm {
            prompt: prompt.into(),
            model: None,
            provider_id: None,
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule(_) => f.debug_tuple("Rule").field(&"<function>").finish(),
            Self::Regex {
                pattern,
                match_target,
                else_target,
            } => f
                .debug_struct("Regex")
                .field("pattern", &pattern.as_str())
                .field("match_target", match_target)
                .field("else_target", else_target)
                .finish(),
            Self::Llm { prompt, model, provider_id } => f
                .debug_struct("Llm")
                .field("prompt", prompt)
                .field("model", model)
                .field("provider_id", provider_id)
                .finish(),
        }
    }
}

/// Conditional routing from a node to one of several labeled targets
#[derive(Debug, Clone)]
pub struct ConditionalEdge {
    /// Source node whose output is routed
    pub from: NodeId,
    /// Routing function
    pub evaluate: Evaluator,
    /// Label → target node id
    pub targets: HashMap<String, NodeId>,
}

/// The run graph: nodes, edges, conditional edges
///
/// Built by callers before a run; mutated only by the executor while a
/// run is in progress (append-only).
#[derive(Debug, Clone)]
pub struct SwarmGraph {
    /// Graph identifier, surfaced in `swarm_start`
    pub id: String,
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge>,
    dynamic_nodes: HashSet<NodeId>,
}

impl SwarmGraph {
    /// Create an empty graph
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: Vec::new(),
            dynamic_nodes: HashSet::new(),
        }
    }

    /// Add a node; duplicate ids are a configuration error
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(SwarmError::Configuration(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        if node.can_emit_dag {
            self.dynamic_nodes.insert(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add a regular dependency edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) {
        self.edges.push(Edge::new(from, to));
    }

    /// Add a feedback edge bounded by `max_cycles`
    pub fn add_feedback_edge(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        max_cycles: u32,
    ) {
        self.edges.push(Edge::feedback(from, to, max_cycles));
    }

    /// Append an already-built edge (used by dynamic expansion)
    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Add a conditional edge from `from` routed by `evaluate`
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<NodeId>,
        evaluate: Evaluator,
        targets: HashMap<String, NodeId>,
    ) {
        self.conditional_edges.push(ConditionalEdge {
            from: from.into(),
            evaluate,
            targets,
        });
    }

    /// The node with the given id
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Regular edges targeting `id`
    pub fn incoming_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to == id).collect()
    }

    /// Regular edges leaving `id`
    pub fn outgoing_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Conditional edges leaving `id`
    pub fn conditional_edges_from(&self, id: &str) -> Vec<&ConditionalEdge> {
        self.conditional_edges
            .iter()
            .filter(|e| e.from == id)
            .collect()
    }

    /// All conditional edges
    pub fn conditional_edges(&self) -> &[ConditionalEdge] {
        &self.conditional_edges
    }

    /// All regular edges
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Nodes with no incoming regular edge, sorted by id
    pub fn root_nodes(&self) -> Vec<NodeId> {
        let targets: HashSet<&NodeId> = self.edges.iter().map(|e| &e.to).collect();
        let mut roots: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !targets.contains(id))
            .cloned()
            .collect();
        roots.sort();
        roots
    }

    /// Nodes with no outgoing regular edge, sorted by id
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        let sources: HashSet<&NodeId> = self.edges.iter().map(|e| &e.from).collect();
        let mut leaves: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !sources.contains(id))
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }

    /// All node ids, sorted
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node ids that are targets of any conditional edge
    pub fn conditional_targets(&self) -> HashSet<NodeId> {
        self.conditional_edges
            .iter()
            .flat_map(|e| e.targets.values().cloned())
            .collect()
    }

    /// Node ids marked for dynamic expansion
    pub fn dynamic_nodes(&self) -> &HashSet<NodeId> {
        &self.dynamic_nodes
    }
}

/// Sub-graph emitted by a coordinator node
///
/// Coordinators describe expansion as a JSON object with `nodes` and
/// `edges` arrays, optionally wrapped in a markdown code fence. Entries
/// that fail to parse are dropped individually; output that is not JSON
/// at all is simply not an expansion.
#[derive(Debug, Clone, Default)]
pub struct SubDag {
    /// Nodes to append
    pub nodes: Vec<Node>,
    /// Edges to append
    pub edges: Vec<Edge>,
}

impl SubDag {
    /// Parse a coordinator's output into a sub-graph
    ///
    /// Returns `None` when the output carries no parsable JSON object
    /// with a `nodes` or `edges` array.
    pub fn parse(output: &str) -> Option<Self> {
        let json_str = extract_json(output)?;
        let value: serde_json::Value = serde_json::from_str(json_str).ok()?;
        let obj = value.as_object()?;
        if !obj.contains_key("nodes") && !obj.contains_key("edges") {
            return None;
        }

        let nodes = obj
            .get("nodes")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let mut node: Node = serde_json::from_value(entry.clone()).ok()?;
                        if node.id.is_empty() {
                            return None;
                        }
                        if node.agent.name.is_empty() {
                            node.agent.name = node.agent.id.clone();
                        }
                        if node.agent.role.is_empty() {
                            node.agent.role = "agent".to_string();
                        }
                        Some(node)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let edges = obj
            .get("edges")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let edge: Edge = serde_json::from_value(entry.clone()).ok()?;
                        (!edge.from.is_empty() && !edge.to.is_empty()).then_some(edge)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { nodes, edges })
    }

    /// True when the expansion carries nothing
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Extract a JSON payload from model output
///
/// Looks for a fenced ```json block first, then falls back to the
/// outermost brace span.
fn extract_json(text: &str) -> Option<&str> {
    for fence in ["```json", "```JSON"] {
        if let Some(start) = text.find(fence) {
            let content = &text[start + fence.len()..];
            if let Some(end) = content.find("```") {
                return Some(content[..end].trim());
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].trim())
}
