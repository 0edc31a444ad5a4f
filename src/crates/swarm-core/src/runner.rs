//! One agent invocation: context → provider stream → tool loop
//!
//! The runner executes a single iteration of a single node. It
//! assembles context under the model's token budget, opens a provider
//! stream with the coordination toolset bound, executes tool calls
//! locally against shared memory, and emits the node-scoped events in
//! order: `agent_start`, then chunks and tool uses, then exactly one of
//! `agent_done` or `agent_error`.
//!
//! Tool-call failures are recovered locally: the model observes a
//! human-readable error string and the loop continues. Only provider
//! stream failures end the node.

use crate::agent::AgentDescriptor;
use crate::context::{
    ContextAssembler, PRIORITY_CODEBASE, PRIORITY_COORDINATION, PRIORITY_CORE, PRIORITY_ENTITY,
    PRIORITY_MEMORY, PRIORITY_UPSTREAM,
};
use crate::cost::CostTracker;
use crate::error::AgentErrorType;
use crate::events::{EventSender, SwarmEvent};
use crate::external::{CodebaseTier, ExternalAdapters};
use crate::graph::NodeId;
use crate::memory::SwarmMemory;
use crate::messages::{Message, ToolCall};
use crate::provider::{ProviderAdapter, ProviderEvent, StreamParams};
use crate::tools::{
    coordination_tools, TOOL_SCRATCHPAD_APPEND, TOOL_SCRATCHPAD_READ, TOOL_SCRATCHPAD_SET,
    TOOL_SEND_MESSAGE,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many memory search hits are folded into context
const MEMORY_SEARCH_K: usize = 5;

/// Inputs for one node iteration
#[derive(Debug, Clone)]
pub struct RunnerRequest {
    /// Node being executed
    pub node_id: NodeId,
    /// The agent bound to the node
    pub agent: AgentDescriptor,
    /// Effective task (node override or swarm task)
    pub task: String,
    /// Most recent outputs of regular upstream neighbors, by node id
    pub upstream_outputs: Vec<(NodeId, String)>,
}

/// How one node iteration ended
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    /// The node produced output; `agent_done` was emitted
    Completed {
        /// Accumulated output text
        output: String,
    },
    /// The node failed; `agent_error` was emitted
    Failed {
        /// Error message
        message: String,
        /// Classified failure kind
        error_type: AgentErrorType,
    },
}

/// Executes node iterations against shared run state
pub struct AgentRunner {
    memory: Arc<SwarmMemory>,
    cost: Arc<CostTracker>,
    externals: ExternalAdapters,
    default_model: String,
    repo_id: Option<String>,
}

impl AgentRunner {
    /// Create a runner over one run's shared state
    pub fn new(
        memory: Arc<SwarmMemory>,
        cost: Arc<CostTracker>,
        externals: ExternalAdapters,
        default_model: impl Into<String>,
        repo_id: Option<String>,
    ) -> Self {
        Self {
            memory,
            cost,
            externals,
            default_model: default_model.into(),
            repo_id,
        }
    }

    /// The model used when an agent names none
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Run one iteration of one node
    ///
    /// Emits all node-scoped events through `events` and returns the
    /// outcome the executor applies to the scheduler.
    pub async fn run(
        &self,
        request: RunnerRequest,
        provider: Arc<dyn ProviderAdapter>,
        events: &EventSender,
        signal: &CancellationToken,
    ) -> RunnerOutcome {
        let RunnerRequest {
            node_id,
            agent,
            task,
            upstream_outputs,
        } = request;

        events.send(SwarmEvent::AgentStart {
            node_id: node_id.clone(),
            agent_role: agent.role.clone(),
            agent_name: agent.name.clone(),
        });

        let model = agent
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let limits = provider.get_model_limits(&model);

        let mut transcript = self
            .assemble_context(&node_id, &agent, &task, &upstream_outputs, limits.context_window)
            .await;
        let tools = coordination_tools();

        let mut output = String::new();

        // Tool-use loop: each stream either finishes the node or asks
        // for a tool call. A tool_use event is one round: the stream
        // is abandoned on the first one, the call is answered, and a
        // fresh stream continues from the extended transcript.
        loop {
            if signal.is_cancelled() {
                return self.fail(events, &node_id, &agent, "stream aborted by cancellation signal");
            }

            let params = StreamParams {
                model: model.clone(),
                messages: transcript.clone(),
                temperature: agent.temperature,
                max_tokens: agent.max_tokens,
                tools: tools.clone(),
                signal: signal.clone(),
            };

            let mut stream = match provider.stream(params).await {
                Ok(stream) => stream,
                Err(err) => return self.fail(events, &node_id, &agent, &err.to_string()),
            };

            let mut pending_call: Option<ToolCall> = None;
            while let Some(event) = stream.next().await {
                match event {
                    Ok(ProviderEvent::Chunk { content }) => {
                        output.push_str(&content);
                        events.send(SwarmEvent::AgentChunk {
                            node_id: node_id.clone(),
                            agent_role: agent.role.clone(),
                            content,
                        });
                    }
                    Ok(ProviderEvent::ToolUse { id, name, input }) => {
                        pending_call = Some(ToolCall { id, name, input });
                        break;
                    }
                    Ok(ProviderEvent::Usage {
                        input_tokens,
                        output_tokens,
                    }) => {
                        self.cost
                            .record(&agent.id, &node_id, &model, input_tokens, output_tokens);
                    }
                    Err(err) => {
                        return self.fail(events, &node_id, &agent, &err.to_string());
                    }
                }
            }
            drop(stream);

            let Some(call) = pending_call else {
                break;
            };

            // Answer the call locally and extend the transcript with
            // the single-call record plus its observation.
            let observation = self.execute_tool(&agent.id, &call.name, &call.input);
            debug!(node = %node_id, tool = %call.name, "coordination tool executed");
            events.send(SwarmEvent::AgentToolUse {
                node_id: node_id.clone(),
                tool: call.name.clone(),
                input: call.input.clone(),
            });
            transcript
                .push(Message::assistant(output.clone()).with_tool_calls(vec![call.clone()]));
            transcript.push(Message::tool(observation, call.id));
        }

        events.send(SwarmEvent::AgentDone {
            node_id: node_id.clone(),
            agent_role: agent.role.clone(),
            output: output.clone(),
            cost: self.cost.node_total(&node_id),
            artifact_request: None,
        });

        RunnerOutcome::Completed { output }
    }

    fn fail(
        &self,
        events: &EventSender,
        node_id: &str,
        agent: &AgentDescriptor,
        message: &str,
    ) -> RunnerOutcome {
        let error_type = AgentErrorType::classify(message);
        warn!(node = %node_id, error_type = %error_type, "agent failed: {}", message);
        events.send(SwarmEvent::AgentError {
            node_id: node_id.to_string(),
            agent_role: agent.role.clone(),
            message: message.to_string(),
            error_type,
        });
        RunnerOutcome::Failed {
            message: message.to_string(),
            error_type,
        }
    }

    /// Build the message list for this invocation
    async fn assemble_context(
        &self,
        node_id: &str,
        agent: &AgentDescriptor,
        task: &str,
        upstream_outputs: &[(NodeId, String)],
        context_window: u32,
    ) -> Vec<Message> {
        let mut assembler = ContextAssembler::new();

        // Persona attaches at assembly time: an explicit persona on the
        // descriptor wins over the persona provider.
        let persona = match &agent.persona {
            Some(persona) => Some(persona.clone()),
            None => match &self.externals.persona {
                Some(provider) => provider.get_persona(&agent.role).await,
                None => None,
            },
        };
        if let Some(persona) = persona {
            assembler.add_segment(PRIORITY_CORE, persona.render());
        }
        assembler.add_segment(PRIORITY_CORE, agent.system_prompt.clone());

        for (from, output) in upstream_outputs {
            assembler.add_segment(
                PRIORITY_UPSTREAM,
                format!("Output from {}:\n{}", from, output),
            );
        }

        let inbox = self.memory.channels.inbox(&agent.id);
        if !inbox.is_empty() {
            let mut block = String::from("Messages for you:\n");
            for message in &inbox {
                block.push_str(&format!("[{}] {}\n", message.from, message.content));
            }
            assembler.add_segment(PRIORITY_COORDINATION, block.trim_end().to_string());
        }
        assembler.add_segment(PRIORITY_COORDINATION, self.memory.scratchpad.to_context_string());

        if let Some(provider) = &self.externals.context {
            assembler.add_segment(PRIORITY_ENTITY, provider.get_context("node", node_id).await);
        }

        if let Some(provider) = &self.externals.memory {
            let hits = provider.search(task, MEMORY_SEARCH_K).await;
            if !hits.is_empty() {
                let mut block = String::from("Relevant memory:\n");
                for hit in hits {
                    block.push_str(&format!("- {}\n", hit.text));
                }
                assembler.add_segment(PRIORITY_MEMORY, block.trim_end().to_string());
            }
        }

        if let (Some(provider), Some(repo_id)) = (&self.externals.codebase, &self.repo_id) {
            assembler.add_segment(
                PRIORITY_CODEBASE,
                provider.query(repo_id, task, CodebaseTier::Standard).await,
            );
        }

        assembler.assemble(task, context_window)
    }

    /// Execute one coordination tool call against shared memory
    ///
    /// Always returns a string observation; quota and argument errors
    /// come back as text for the model to see.
    fn execute_tool(&self, agent_id: &str, name: &str, input: &Value) -> String {
        match name {
            TOOL_SEND_MESSAGE => {
                let Some(to) = input.get("to").and_then(Value::as_str) else {
                    return "Error: send_message requires a 'to' field".to_string();
                };
                let content = input.get("content").and_then(Value::as_str).unwrap_or("");
                self.memory.channels.send(agent_id, to, content, None);
                format!("Message sent to {}", to)
            }
            TOOL_SCRATCHPAD_SET => {
                let Some(key) = input.get("key").and_then(Value::as_str) else {
                    return "Error: scratchpad_set requires a 'key' field".to_string();
                };
                let value = input.get("value").cloned().unwrap_or(Value::Null);
                match self.memory.scratchpad.set(key, value, agent_id) {
                    Ok(()) => format!("Stored value at '{}'", key),
                    Err(err) => format!("Error: {}", err),
                }
            }
            TOOL_SCRATCHPAD_READ => {
                let Some(key) = input.get("key").and_then(Value::as_str) else {
                    return "Error: scratchpad_read requires a 'key' field".to_string();
                };
                match self.memory.scratchpad.get(key) {
                    Some(value) => {
                        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
                    }
                    None => "not found".to_string(),
                }
            }
            TOOL_SCRATCHPAD_APPEND => {
                let Some(key) = input.get("key").and_then(Value::as_str) else {
                    return "Error: scratchpad_append requires a 'key' field".to_string();
                };
                let value = input.get("value").cloned().unwrap_or(Value::Null);
                match self.memory.scratchpad.append(key, value, agent_id) {
                    Ok(()) => format!("Appended value to '{}'", key),
                    Err(err) => format!("Error: {}", err),
                }
            }
            _ => "Unknown tool".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::PricingTable;
    use crate::error::Result;
    use crate::provider::ProviderEventStream;
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;
    use serde_json::json;

    fn runner() -> AgentRunner {
        AgentRunner::new(
            Arc::new(SwarmMemory::new()),
            Arc::new(CostTracker::new(PricingTable::default(), None, None)),
            ExternalAdapters::default(),
            "test-model",
            None,
        )
    }

    fn request(node_id: &str) -> RunnerRequest {
        RunnerRequest {
            node_id: node_id.to_string(),
            agent: AgentDescriptor::new(node_id, node_id, "worker", "work"),
            task: "do the thing".to_string(),
            upstream_outputs: vec![],
        }
    }

    /// Provider whose streams are scripted per call, in order
    struct Scripted {
        calls: Mutex<Vec<Vec<Result<ProviderEvent>>>>,
        seen_params: Mutex<Vec<StreamParams>>,
    }

    impl Scripted {
        fn new(calls: Vec<Vec<Result<ProviderEvent>>>) -> Self {
            Self {
                calls: Mutex::new(calls),
                seen_params: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        async fn stream(&self, params: StreamParams) -> Result<ProviderEventStream> {
            self.seen_params.lock().push(params);
            let mut calls = self.calls.lock();
            let events = if calls.is_empty() {
                vec![]
            } else {
                calls.remove(0)
            };
            Ok(Box::pin(stream::iter(events)))
        }
    }

    fn chunk(text: &str) -> Result<ProviderEvent> {
        Ok(ProviderEvent::Chunk {
            content: text.to_string(),
        })
    }

    fn usage(input: u64, output: u64) -> Result<ProviderEvent> {
        Ok(ProviderEvent::Usage {
            input_tokens: input,
            output_tokens: output,
        })
    }

    async fn collect(events: crate::events::EventStream) -> Vec<SwarmEvent> {
        events.collect_all().await
    }

    #[tokio::test]
    async fn test_simple_completion() {
        let provider = Arc::new(Scripted::new(vec![vec![
            chunk("hello "),
            chunk("world"),
            usage(10, 5),
        ]]));
        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();

        let outcome = runner
            .run(request("n1"), provider, &tx, &CancellationToken::new())
            .await;
        drop(tx);

        match outcome {
            RunnerOutcome::Completed { output } => assert_eq!(output, "hello world"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let events = collect(rx).await;
        assert!(matches!(events[0], SwarmEvent::AgentStart { .. }));
        assert!(matches!(events[1], SwarmEvent::AgentChunk { .. }));
        assert!(matches!(events[2], SwarmEvent::AgentChunk { .. }));
        match &events[3] {
            SwarmEvent::AgentDone { output, cost, .. } => {
                assert_eq!(output, "hello world");
                assert_eq!(cost.input_tokens, 10);
                assert_eq!(cost.calls, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_round_restarts_stream() {
        let provider = Arc::new(Scripted::new(vec![
            vec![
                Ok(ProviderEvent::ToolUse {
                    id: "call_1".to_string(),
                    name: TOOL_SCRATCHPAD_SET.to_string(),
                    input: json!({"key": "plan", "value": "v1"}),
                }),
                usage(5, 2),
            ],
            vec![chunk("done"), usage(8, 3)],
        ]));
        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();

        let outcome = runner
            .run(request("n1"), provider.clone(), &tx, &CancellationToken::new())
            .await;
        drop(tx);

        assert!(matches!(outcome, RunnerOutcome::Completed { .. }));
        assert_eq!(runner.memory.scratchpad.get("plan"), Some(json!("v1")));

        let events = collect(rx).await;
        let tool_uses: Vec<&SwarmEvent> = events
            .iter()
            .filter(|e| matches!(e, SwarmEvent::AgentToolUse { .. }))
            .collect();
        assert_eq!(tool_uses.len(), 1);

        // The second stream call carries the assistant record and the
        // tool observation.
        let params = provider.seen_params.lock();
        assert_eq!(params.len(), 2);
        let second = &params[1].messages;
        assert!(second.iter().any(|m| m.tool_calls.is_some()));
        assert!(second
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("call_1")));
    }

    #[tokio::test]
    async fn test_each_tool_use_is_its_own_round() {
        // Two tool_use events arrive in the first stream; the stream is
        // abandoned at the first one, so the second must be
        // re-requested in the next round to take effect.
        let provider = Arc::new(Scripted::new(vec![
            vec![
                Ok(ProviderEvent::ToolUse {
                    id: "call_1".to_string(),
                    name: TOOL_SCRATCHPAD_SET.to_string(),
                    input: json!({"key": "first", "value": "v1"}),
                }),
                Ok(ProviderEvent::ToolUse {
                    id: "abandoned".to_string(),
                    name: TOOL_SCRATCHPAD_SET.to_string(),
                    input: json!({"key": "second", "value": "never written"}),
                }),
            ],
            vec![Ok(ProviderEvent::ToolUse {
                id: "call_2".to_string(),
                name: TOOL_SCRATCHPAD_SET.to_string(),
                input: json!({"key": "second", "value": "v2"}),
            })],
            vec![chunk("done"), usage(8, 3)],
        ]));
        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();

        let outcome = runner
            .run(request("n1"), provider.clone(), &tx, &CancellationToken::new())
            .await;
        drop(tx);

        assert!(matches!(outcome, RunnerOutcome::Completed { .. }));
        assert_eq!(runner.memory.scratchpad.get("first"), Some(json!("v1")));
        // The abandoned call never executed; only the re-request did.
        assert_eq!(runner.memory.scratchpad.get("second"), Some(json!("v2")));
        assert_eq!(runner.memory.scratchpad.history("second").len(), 1);

        // One restart per tool_use: three provider calls in total.
        let params = provider.seen_params.lock();
        assert_eq!(params.len(), 3);

        // Each assistant record carries exactly one call, and the
        // abandoned id never reaches the transcript.
        let final_messages = &params[2].messages;
        let assistant_rounds: Vec<&Message> = final_messages
            .iter()
            .filter(|m| m.tool_calls.is_some())
            .collect();
        assert_eq!(assistant_rounds.len(), 2);
        for round in &assistant_rounds {
            assert_eq!(round.tool_calls.as_ref().unwrap().len(), 1);
        }
        assert!(!final_messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("abandoned")));

        let events = collect(rx).await;
        let tool_uses = events
            .iter()
            .filter(|e| matches!(e, SwarmEvent::AgentToolUse { .. }))
            .count();
        assert_eq!(tool_uses, 2);
    }

    #[tokio::test]
    async fn test_quota_error_recovered_locally() {
        let runner = AgentRunner::new(
            Arc::new(SwarmMemory::with_limits(4, 100)),
            Arc::new(CostTracker::new(PricingTable::default(), None, None)),
            ExternalAdapters::default(),
            "test-model",
            None,
        );
        let provider = Arc::new(Scripted::new(vec![
            vec![Ok(ProviderEvent::ToolUse {
                id: "call_1".to_string(),
                name: TOOL_SCRATCHPAD_SET.to_string(),
                input: json!({"key": "k", "value": "far too large for the quota"}),
            })],
            vec![chunk("recovered")],
        ]));
        let (tx, rx) = crate::events::EventStream::channel();

        let outcome = runner
            .run(request("n1"), provider.clone(), &tx, &CancellationToken::new())
            .await;
        drop(tx);

        // The node still completes; the model saw the error string.
        assert!(matches!(outcome, RunnerOutcome::Completed { .. }));
        let params = provider.seen_params.lock();
        let observation = params[1]
            .messages
            .iter()
            .find(|m| m.tool_call_id.is_some())
            .unwrap();
        assert!(observation.content.contains("Error"));

        let events = collect(rx).await;
        assert!(events.iter().any(|e| matches!(e, SwarmEvent::AgentDone { .. })));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_noop() {
        let runner = runner();
        assert_eq!(
            runner.execute_tool("a", "launch_missiles", &json!({})),
            "Unknown tool"
        );
    }

    #[tokio::test]
    async fn test_send_message_lands_in_inbox() {
        let runner = runner();
        let result = runner.execute_tool(
            "sender",
            TOOL_SEND_MESSAGE,
            &json!({"to": "receiver", "content": "hi"}),
        );
        assert_eq!(result, "Message sent to receiver");
        assert_eq!(runner.memory.channels.inbox("receiver").len(), 1);
    }

    #[tokio::test]
    async fn test_scratchpad_read_not_found() {
        let runner = runner();
        assert_eq!(
            runner.execute_tool("a", TOOL_SCRATCHPAD_READ, &json!({"key": "absent"})),
            "not found"
        );
    }

    #[tokio::test]
    async fn test_provider_error_fails_node() {
        struct Failing;

        #[async_trait]
        impl ProviderAdapter for Failing {
            async fn stream(&self, _params: StreamParams) -> Result<ProviderEventStream> {
                Err(crate::error::SwarmError::Provider(
                    "HTTP 429 rate limit".to_string(),
                ))
            }
        }

        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();
        let outcome = runner
            .run(request("n1"), Arc::new(Failing), &tx, &CancellationToken::new())
            .await;
        drop(tx);

        match outcome {
            RunnerOutcome::Failed { error_type, .. } => {
                assert_eq!(error_type, AgentErrorType::RateLimit)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let events = collect(rx).await;
        assert!(matches!(events[0], SwarmEvent::AgentStart { .. }));
        assert!(matches!(events[1], SwarmEvent::AgentError { .. }));
    }

    #[tokio::test]
    async fn test_mid_stream_error_fails_node() {
        let provider = Arc::new(Scripted::new(vec![vec![
            chunk("partial"),
            Err(crate::error::SwarmError::Provider(
                "connection reset".to_string(),
            )),
        ]]));
        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();

        let outcome = runner
            .run(request("n1"), provider, &tx, &CancellationToken::new())
            .await;
        drop(tx);

        match outcome {
            RunnerOutcome::Failed { error_type, .. } => {
                assert_eq!(error_type, AgentErrorType::NetworkError)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let events = collect(rx).await;
        // Chunks may precede the error; agent_done never appears.
        assert!(events.iter().any(|e| matches!(e, SwarmEvent::AgentError { .. })));
        assert!(!events.iter().any(|e| matches!(e, SwarmEvent::AgentDone { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_stream_is_timeout() {
        let provider = Arc::new(Scripted::new(vec![vec![chunk("never seen")]]));
        let runner = runner();
        let (tx, rx) = crate::events::EventStream::channel();
        let signal = CancellationToken::new();
        signal.cancel();

        let outcome = runner.run(request("n1"), provider, &tx, &signal).await;
        drop(tx);

        match outcome {
            RunnerOutcome::Failed { error_type, .. } => {
                assert_eq!(error_type, AgentErrorType::Timeout)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let events = collect(rx).await;
        assert!(matches!(events.last(), Some(SwarmEvent::AgentError { .. })));
    }

    #[tokio::test]
    async fn test_upstream_outputs_reach_context() {
        let provider = Arc::new(Scripted::new(vec![vec![chunk("ok")]]));
        let runner = runner();
        let (tx, _rx) = crate::events::EventStream::channel();

        let mut req = request("d");
        req.upstream_outputs = vec![
            ("b".to_string(), "from B".to_string()),
            ("c".to_string(), "from C".to_string()),
        ];
        runner
            .run(req, provider.clone(), &tx, &CancellationToken::new())
            .await;

        let params = provider.seen_params.lock();
        let system = &params[0].messages[0].content;
        assert!(system.contains("Output from b:\nfrom B"));
        assert!(system.contains("Output from c:\nfrom C"));
    }
}
