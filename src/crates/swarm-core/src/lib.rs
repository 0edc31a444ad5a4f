//! # swarm-core - Coordinated Multi-Agent LLM Runs
//!
//! Execute a directed graph of cooperating LLM-driven agents as a
//! single coordinated run. Each node is one agent invocation; edges
//! encode data dependencies, conditional routing, and bounded feedback
//! loops. The engine streams a strictly ordered sequence of observation
//! events as the graph progresses, enforces cost and duration budgets,
//! propagates failures, and lets coordinator nodes expand the graph
//! mid-run.
//!
//! ## Core Concepts
//!
//! ### The graph
//!
//! A [`SwarmGraph`] wires [`Node`]s (each carrying an
//! [`AgentDescriptor`]) with three kinds of edges:
//!
//! - **Regular edges**: data dependencies; a node runs when every
//!   regular upstream neighbor has completed.
//! - **Feedback edges**: regular edges with a `maxCycles` bound; the
//!   target is re-scheduled until the bound is reached.
//! - **Conditional edges**: an [`Evaluator`] (rule, regex, or LLM)
//!   routes the source's output to exactly one labeled target; the
//!   rest are skipped.
//!
//! Nodes flagged `canEmitDAG` are coordinators: when one completes, its
//! output is parsed as a JSON sub-graph and appended to the run.
//!
//! ### The event stream
//!
//! [`SwarmEngine::execute`] returns a lazy [`EventStream`] of
//! [`SwarmEvent`]s, the observable contract. `swarm_start` is always
//! first; exactly one of `swarm_done`, `swarm_error`, or
//! `swarm_cancelled` is always last. Monitors and GUIs are reducers
//! over this stream.
//!
//! ### Shared memory and coordination tools
//!
//! Agents coordinate through a byte-quota'd [`Scratchpad`] and an
//! append-only message log ([`Channels`]), exposed to every model as a
//! fixed toolset (`send_message`, `scratchpad_set`, `scratchpad_read`,
//! `scratchpad_append`). Tool failures are observations, never node
//! failures.
//!
//! ### Cost and budgets
//!
//! Every provider `usage` event lands in the [`CostTracker`] as integer
//! cents. Totals are kept per node, per agent, and swarm-wide, and the
//! three ledgers always agree. A swarm budget aborts the run when
//! exhausted; a per-agent budget raises `budget_exceeded` events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use swarm_core::{AgentDescriptor, Node, SwarmEngine, SwarmGraph};
//! use futures::StreamExt;
//!
//! let mut graph = SwarmGraph::new("pipeline");
//! graph.add_node(Node::new(
//!     "researcher",
//!     AgentDescriptor::new("researcher", "Researcher", "researcher", "Dig deep."),
//! ))?;
//! graph.add_node(Node::new(
//!     "writer",
//!     AgentDescriptor::new("writer", "Writer", "writer", "Write clearly."),
//! ))?;
//! graph.add_edge("researcher", "writer");
//!
//! let engine = SwarmEngine::new(my_provider_adapter);
//! let mut events = engine.execute(graph, "explain the findings");
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```
//!
//! ## Providers
//!
//! The engine is an orchestration layer: LLM transports live behind the
//! [`ProviderAdapter`] trait and are registered by id. Per node, the
//! effective provider is `registry[agent.providerId]` falling back to
//! the engine's default.

pub mod agent;
pub mod context;
pub mod cost;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod external;
pub mod graph;
pub mod memory;
pub mod messages;
pub mod provider;
pub mod runner;
pub mod scheduler;
pub mod tools;
pub mod validator;

pub use agent::{AgentDescriptor, PersonaConfig};
pub use context::{ContextAssembler, ContextSegment};
pub use cost::{BudgetStatus, CostSummary, CostTracker, ModelPrice, PricingTable};
pub use engine::{SwarmConfig, SwarmEngine};
pub use error::{AgentErrorType, Result, SwarmError};
pub use events::{EventSender, EventStream, SwarmEvent};
pub use executor::{ExecutorOptions, SwarmExecutor};
pub use external::{
    CodebaseProvider, CodebaseTier, ContextProvider, ExternalAdapters, LifecycleHooks,
    MemoryHit, MemoryProvider, PersistenceAdapter, PersonaProvider, RunRecord,
};
pub use graph::{ConditionalEdge, Edge, Evaluator, Node, NodeId, SubDag, SwarmGraph};
pub use memory::{ChannelMessage, Channels, Scratchpad, SwarmMemory, WriteOp, WriteRecord, BROADCAST};
pub use messages::{Message, MessageRole, ToolCall};
pub use provider::{
    ModelLimits, ProviderAdapter, ProviderEvent, ProviderEventStream, ProviderRegistry,
    StreamParams,
};
pub use runner::{AgentRunner, RunnerOutcome, RunnerRequest};
pub use scheduler::{NodeStatus, Scheduler};
pub use tools::{coordination_tools, ToolDefinition};
pub use validator::{validate, ValidationReport};
