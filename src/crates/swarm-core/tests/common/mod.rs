//! Shared test fixtures: a scripted provider and event helpers
//!
//! The scripted provider routes each stream request to a per-node
//! script by looking for a `<<node:ID>>` marker in the assembled
//! messages; test agents carry the marker in their system prompts and
//! coordinator-emitted agents carry it in their `systemPrompt` field.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use swarm_core::{
    AgentDescriptor, ProviderAdapter, ProviderEvent, ProviderEventStream, Result, StreamParams,
    SwarmError, SwarmEvent,
};

/// One scripted provider action
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit a text chunk
    Chunk(String),
    /// Emit token usage
    Usage(u64, u64),
    /// Request a tool call
    #[allow(dead_code)]
    ToolUse { id: String, name: String, input: Value },
    /// Fail the stream with the given message
    Fail(String),
}

impl Step {
    fn into_event(self) -> Result<ProviderEvent> {
        match self {
            Step::Chunk(content) => Ok(ProviderEvent::Chunk { content }),
            Step::Usage(input_tokens, output_tokens) => Ok(ProviderEvent::Usage {
                input_tokens,
                output_tokens,
            }),
            Step::ToolUse { id, name, input } => Ok(ProviderEvent::ToolUse { id, name, input }),
            Step::Fail(message) => Err(SwarmError::Provider(message)),
        }
    }
}

/// Split a reply into chunks plus a usage record
pub fn say(text: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    match text.split_once(' ') {
        Some((head, tail)) => {
            steps.push(Step::Chunk(format!("{} ", head)));
            steps.push(Step::Chunk(tail.to_string()));
        }
        None => steps.push(Step::Chunk(text.to_string())),
    }
    steps.push(Step::Usage(10, 5));
    steps
}

/// Provider that answers from per-node scripts
///
/// A node with several queued scripts consumes them in order; the last
/// script repeats for any further calls (feedback loops).
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Vec<Step>>>>,
    pub seen_params: Mutex<Vec<StreamParams>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            seen_params: Mutex::new(Vec::new()),
        }
    }

    /// Script a repeating text reply for a node
    pub fn say_for(self, key: &str, text: &str) -> Self {
        self.steps_for(key, vec![say(text)])
    }

    /// Script explicit step sequences for a node, consumed per call
    pub fn steps_for(self, key: &str, scripts: Vec<Vec<Step>>) -> Self {
        self.scripts
            .lock()
            .insert(key.to_string(), scripts.into_iter().collect());
        self
    }

    /// Messages seen by a given node's calls, for context assertions
    pub fn params_for(&self, key: &str) -> Vec<StreamParams> {
        let marker = marker(key);
        self.seen_params
            .lock()
            .iter()
            .filter(|p| {
                p.messages
                    .iter()
                    .any(|m| m.content.contains(&marker))
            })
            .cloned()
            .collect()
    }
}

fn marker(key: &str) -> String {
    format!("<<node:{}>>", key)
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn stream(&self, params: StreamParams) -> Result<ProviderEventStream> {
        self.seen_params.lock().push(params.clone());

        let text: String = params
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        // Pick the script whose marker appears earliest: a node's own
        // system prompt leads the assembled text, while markers quoted
        // in upstream output (a coordinator's sub-graph JSON) show up
        // later.
        let mut scripts = self.scripts.lock();
        let best_key: Option<String> = scripts
            .keys()
            .filter_map(|key| text.find(&marker(key)).map(|at| (at, key.clone())))
            .min_by_key(|(at, _)| *at)
            .map(|(_, key)| key);

        let chosen: Option<Vec<Step>> = best_key.and_then(|key| {
            scripts.get_mut(&key).map(|queue| {
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                }
            })
        });

        let steps = chosen.unwrap_or_else(|| say("ok"));
        let events: Vec<Result<ProviderEvent>> =
            steps.into_iter().map(Step::into_event).collect();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// A test agent whose system prompt carries the routing marker
pub fn agent(id: &str) -> AgentDescriptor {
    AgentDescriptor::new(
        id,
        id.to_uppercase(),
        "worker",
        format!("You are {}. {}", id, marker(id)),
    )
}

/// Short tag for an event, for sequence assertions
pub fn kind(event: &SwarmEvent) -> &'static str {
    match event {
        SwarmEvent::SwarmStart { .. } => "swarm_start",
        SwarmEvent::SwarmProgress { .. } => "swarm_progress",
        SwarmEvent::SwarmDone { .. } => "swarm_done",
        SwarmEvent::SwarmError { .. } => "swarm_error",
        SwarmEvent::SwarmCancelled { .. } => "swarm_cancelled",
        SwarmEvent::AgentStart { .. } => "agent_start",
        SwarmEvent::AgentChunk { .. } => "agent_chunk",
        SwarmEvent::AgentToolUse { .. } => "agent_tool_use",
        SwarmEvent::AgentDone { .. } => "agent_done",
        SwarmEvent::AgentError { .. } => "agent_error",
        SwarmEvent::RouteDecision { .. } => "route_decision",
        SwarmEvent::LoopIteration { .. } => "loop_iteration",
        SwarmEvent::BudgetWarning { .. } => "budget_warning",
        SwarmEvent::BudgetExceeded { .. } => "budget_exceeded",
    }
}

/// Ids of nodes that emitted `agent_start`, in stream order
pub fn started_nodes(events: &[SwarmEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SwarmEvent::AgentStart { node_id, .. } => Some(node_id.clone()),
            _ => None,
        })
        .collect()
}

/// Ids of nodes that emitted `agent_done`, in stream order
pub fn done_nodes(events: &[SwarmEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SwarmEvent::AgentDone { node_id, .. } => Some(node_id.clone()),
            _ => None,
        })
        .collect()
}

/// Concatenated chunk text for one node
pub fn chunk_text(events: &[SwarmEvent], node: &str) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            SwarmEvent::AgentChunk {
                node_id, content, ..
            } if node_id == node => Some(content.as_str()),
            _ => None,
        })
        .collect()
}
