//! The swarm event stream: the engine's observable contract
//!
//! Every run produces one strictly ordered sequence of [`SwarmEvent`]s.
//! The stream is the source of truth: monitors, persistence, and GUIs
//! are reducers over it, and the engine never exposes internal mutable
//! state directly.
//!
//! # Ordering guarantees
//!
//! - `swarm_start` is the first event; exactly one terminal event
//!   (`swarm_done` | `swarm_error` | `swarm_cancelled`) is the last.
//! - Within one node: `agent_start` precedes chunks and tool events,
//!   which precede `agent_done` or `agent_error`.
//! - `route_decision` for a node follows its `agent_done` and precedes
//!   any selected target's `agent_start`.
//!
//! # Wire shape
//!
//! Events serialize as tagged objects with camelCase fields, one record
//! per event, suitable for an SSE monitor façade:
//!
//! ```rust
//! use swarm_core::events::SwarmEvent;
//!
//! let event = SwarmEvent::AgentStart {
//!     node_id: "writer".to_string(),
//!     agent_role: "writer".to_string(),
//!     agent_name: "Writer".to_string(),
//! };
//! let json = serde_json::to_value(&event).unwrap();
//! assert_eq!(json["type"], "agent_start");
//! assert_eq!(json["nodeId"], "writer");
//! ```
//!
//! # Transport
//!
//! [`EventStream`] wraps an unbounded mpsc channel: the executor task
//! is the single producer, the caller the single consumer. A slow
//! consumer buffers (event volume is bounded by node count and chunk
//! rate); a consumer that drops the stream cancels cooperatively via
//! the run's cancellation token.

use crate::cost::CostSummary;
use crate::error::AgentErrorType;
use crate::graph::NodeId;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One observation in the run's authoritative stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwarmEvent {
    /// The run began
    #[serde(rename_all = "camelCase")]
    SwarmStart {
        /// Graph identifier
        dag_id: String,
        /// Nodes known at start
        node_count: usize,
        /// Advisory cost estimate in cents
        #[serde(skip_serializing_if = "Option::is_none")]
        estimated_cost: Option<u64>,
    },

    /// A batch finished
    #[serde(rename_all = "camelCase")]
    SwarmProgress {
        /// Completed node count
        completed: usize,
        /// Total nodes currently in the graph
        total: usize,
        /// Nodes running right now
        running_nodes: Vec<NodeId>,
    },

    /// The run finished; all nodes are terminal
    #[serde(rename_all = "camelCase")]
    SwarmDone {
        /// Final output per completed node
        results: HashMap<NodeId, String>,
        /// Swarm-wide cost totals
        total_cost: CostSummary,
    },

    /// The run aborted
    #[serde(rename_all = "camelCase")]
    SwarmError {
        /// Why the run aborted
        message: String,
        /// Nodes that completed before the abort
        completed_nodes: Vec<NodeId>,
        /// Cost accumulated before the abort
        partial_cost: CostSummary,
    },

    /// The run was cancelled cooperatively
    #[serde(rename_all = "camelCase")]
    SwarmCancelled {
        /// Nodes that completed before cancellation
        completed_nodes: Vec<NodeId>,
        /// Cost accumulated before cancellation
        partial_cost: CostSummary,
    },

    /// A node began an iteration
    #[serde(rename_all = "camelCase")]
    AgentStart {
        /// Node id
        node_id: NodeId,
        /// Agent role tag
        agent_role: String,
        /// Agent display name
        agent_name: String,
    },

    /// A fragment of a node's streamed output
    #[serde(rename_all = "camelCase")]
    AgentChunk {
        /// Node id
        node_id: NodeId,
        /// Agent role tag
        agent_role: String,
        /// Text delta
        content: String,
    },

    /// A node invoked a coordination tool
    #[serde(rename_all = "camelCase")]
    AgentToolUse {
        /// Node id
        node_id: NodeId,
        /// Tool name
        tool: String,
        /// Tool arguments
        input: Value,
    },

    /// A node iteration completed
    #[serde(rename_all = "camelCase")]
    AgentDone {
        /// Node id
        node_id: NodeId,
        /// Agent role tag
        agent_role: String,
        /// Accumulated output text
        output: String,
        /// The node's accumulated cost
        cost: CostSummary,
        /// Artifact the agent asked to publish, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact_request: Option<Value>,
    },

    /// A node iteration failed
    #[serde(rename_all = "camelCase")]
    AgentError {
        /// Node id
        node_id: NodeId,
        /// Agent role tag
        agent_role: String,
        /// Error message
        message: String,
        /// Classified failure kind
        error_type: AgentErrorType,
    },

    /// A conditional edge selected a target
    #[serde(rename_all = "camelCase")]
    RouteDecision {
        /// Source node
        from_node: NodeId,
        /// Selected target
        to_node: NodeId,
        /// Label that selected the target
        reason: String,
    },

    /// A feedback edge completed one iteration of its target
    #[serde(rename_all = "camelCase")]
    LoopIteration {
        /// The re-scheduled node
        node_id: NodeId,
        /// Completions so far (the first completion is 1)
        iteration: u32,
        /// The edge's cycle bound
        max_iterations: u32,
    },

    /// Usage crossed the warning threshold of the swarm budget
    #[serde(rename_all = "camelCase")]
    BudgetWarning {
        /// Cents spent
        used: u64,
        /// Budget in cents
        limit: u64,
        /// Percentage of the budget consumed
        percent_used: f64,
    },

    /// A budget was exhausted
    #[serde(rename_all = "camelCase")]
    BudgetExceeded {
        /// Cents spent
        used: u64,
        /// Budget in cents
        limit: u64,
    },
}

impl SwarmEvent {
    /// True for the three terminal swarm events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SwarmDone { .. } | Self::SwarmError { .. } | Self::SwarmCancelled { .. }
        )
    }

    /// The node this event belongs to, when it is node-scoped
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::AgentStart { node_id, .. }
            | Self::AgentChunk { node_id, .. }
            | Self::AgentToolUse { node_id, .. }
            | Self::AgentDone { node_id, .. }
            | Self::AgentError { node_id, .. }
            | Self::LoopIteration { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Producer half of the event channel
///
/// Cloneable so the executor can hand it to a sequential runner for
/// live forwarding; ordering holds because only one producer writes at
/// a time.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SwarmEvent>,
}

impl EventSender {
    /// Append an event; returns false when the consumer is gone
    pub fn send(&self, event: SwarmEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// True when the consumer dropped the stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half: a lazy sequence of [`SwarmEvent`]s
///
/// Implements [`futures::Stream`]. Dropping the stream without draining
/// is permitted and cancels the run cooperatively.
pub struct EventStream {
    rx: UnboundedReceiverStream<SwarmEvent>,
}

impl EventStream {
    /// Create a connected sender/stream pair
    pub fn channel() -> (EventSender, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSender { tx },
            EventStream {
                rx: UnboundedReceiverStream::new(rx),
            },
        )
    }

    /// Drain every remaining event into a vector
    pub async fn collect_all(mut self) -> Vec<SwarmEvent> {
        use futures::StreamExt;
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = SwarmEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
