//! Engine façade: wiring, validation, and run startup
//!
//! [`SwarmEngine`] holds everything that outlives a single run: the
//! provider registry, defaults and limits, external adapters,
//! persistence, and lifecycle hooks. `execute` validates the graph,
//! prepares per-run shared state, spawns the executor task, and hands
//! back the lazy event stream.
//!
//! ```rust,ignore
//! use swarm_core::{SwarmEngine, SwarmConfig};
//! use futures::StreamExt;
//!
//! let engine = SwarmEngine::new(my_provider)
//!     .with_config(SwarmConfig {
//!         swarm_budget_cents: Some(500),
//!         ..SwarmConfig::default()
//!     });
//!
//! let mut events = engine.execute(graph, "summarize the findings");
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

use crate::cost::{CostTracker, PricingTable};
use crate::events::{EventStream, SwarmEvent};
use crate::executor::{ExecutorOptions, SwarmExecutor};
use crate::external::{ExternalAdapters, LifecycleHooks, PersistenceAdapter, RunRecord};
use crate::graph::SwarmGraph;
use crate::memory::SwarmMemory;
use crate::provider::{ProviderAdapter, ProviderRegistry};
use crate::validator;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Defaults and limits for runs started by one engine
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Model used when an agent names none
    pub default_model: String,
    /// Concurrency cap; `None` is unbounded
    pub max_concurrent_agents: Option<usize>,
    /// Wall-clock limit per run in milliseconds
    pub max_swarm_duration_ms: Option<u64>,
    /// Swarm-wide cost budget in cents; exceeding it aborts the run
    pub swarm_budget_cents: Option<u64>,
    /// Per-agent cost budget in cents; exceeding it only raises events
    pub agent_budget_cents: Option<u64>,
    /// Scratchpad per-value byte limit
    pub scratchpad_max_key_bytes: usize,
    /// Scratchpad total byte limit
    pub scratchpad_max_total_bytes: usize,
    /// Repository id handed to the codebase adapter, when one is wired
    pub repo_id: Option<String>,
    /// Per-model pricing for cost accounting
    pub pricing: PricingTable,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            max_concurrent_agents: None,
            max_swarm_duration_ms: None,
            swarm_budget_cents: None,
            agent_budget_cents: None,
            scratchpad_max_key_bytes: crate::memory::scratchpad::DEFAULT_MAX_KEY_BYTES,
            scratchpad_max_total_bytes: crate::memory::scratchpad::DEFAULT_MAX_TOTAL_BYTES,
            repo_id: None,
            pricing: PricingTable::default(),
        }
    }
}

/// Entry point: wires collaborators and starts runs
pub struct SwarmEngine {
    registry: ProviderRegistry,
    config: SwarmConfig,
    externals: ExternalAdapters,
    persistence: Option<Arc<dyn PersistenceAdapter>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
}

impl SwarmEngine {
    /// Create an engine around a default provider
    pub fn new(default_provider: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            registry: ProviderRegistry::new(default_provider),
            config: SwarmConfig::default(),
            externals: ExternalAdapters::default(),
            persistence: None,
            hooks: None,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: SwarmConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a named provider
    pub fn with_provider(mut self, id: impl Into<String>, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.registry.register(id, provider);
        self
    }

    /// Attach context-side adapters
    pub fn with_externals(mut self, externals: ExternalAdapters) -> Self {
        self.externals = externals;
        self
    }

    /// Attach a persistence observer
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceAdapter>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Attach lifecycle hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The engine's configuration
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Start a run with an engine-owned cancellation token
    ///
    /// Dropping the returned stream also cancels the run
    /// cooperatively. Must be called within a tokio runtime.
    pub fn execute(&self, graph: SwarmGraph, task: impl Into<String>) -> EventStream {
        self.execute_with_signal(graph, task, CancellationToken::new())
    }

    /// Start a run cancellable through the caller's token
    pub fn execute_with_signal(
        &self,
        graph: SwarmGraph,
        task: impl Into<String>,
        signal: CancellationToken,
    ) -> EventStream {
        let task = task.into();
        let run_id = Uuid::new_v4().to_string();
        let (events, stream) = EventStream::channel();

        // Advisory estimate, emitted whether or not validation passes.
        let estimated_cost = (graph.node_count() as u64).div_ceil(2);
        events.send(SwarmEvent::SwarmStart {
            dag_id: graph.id.clone(),
            node_count: graph.node_count(),
            estimated_cost: Some(estimated_cost),
        });

        let validation = validator::validate(&graph, Some(&self.registry));

        let record = RunRecord {
            run_id: run_id.clone(),
            dag_id: graph.id.clone(),
            node_count: graph.node_count(),
        };
        let persistence = self.persistence.clone();
        let hooks = self.hooks.clone();

        match validation {
            Err(err) => {
                info!(run_id = %run_id, "validation failed: {}", err);
                tokio::spawn(async move {
                    if let Some(persistence) = &persistence {
                        persistence.create_run(&record).await;
                    }
                    if let Some(hooks) = &hooks {
                        hooks.on_run_start(&run_id).await;
                    }

                    let message = err.to_string();
                    events.send(SwarmEvent::SwarmError {
                        message: message.clone(),
                        completed_nodes: Vec::new(),
                        partial_cost: Default::default(),
                    });

                    if let Some(persistence) = &persistence {
                        persistence.update_run_status(&run_id, "error").await;
                    }
                    if let Some(hooks) = &hooks {
                        hooks.on_run_failed(&run_id, &message).await;
                    }
                });
            }
            Ok(report) => {
                let cost = Arc::new(CostTracker::new(
                    self.config.pricing.clone(),
                    self.config.swarm_budget_cents,
                    self.config.agent_budget_cents,
                ));
                let memory = Arc::new(SwarmMemory::with_limits(
                    self.config.scratchpad_max_key_bytes,
                    self.config.scratchpad_max_total_bytes,
                ));

                let options = ExecutorOptions {
                    registry: self.registry.clone(),
                    cost,
                    memory,
                    externals: self.externals.clone(),
                    default_model: self.config.default_model.clone(),
                    repo_id: self.config.repo_id.clone(),
                    max_concurrent_agents: self.config.max_concurrent_agents,
                    max_swarm_duration: self.config.max_swarm_duration_ms.map(Duration::from_millis),
                    signal,
                    run_id: run_id.clone(),
                    persistence: persistence.clone(),
                    hooks: hooks.clone(),
                };
                let executor = SwarmExecutor::new(graph, task, events, options);

                info!(
                    run_id = %run_id,
                    estimate_cents = report.estimated_cost_cents,
                    "run validated; starting executor"
                );
                tokio::spawn(async move {
                    if let Some(persistence) = &persistence {
                        persistence.create_run(&record).await;
                    }
                    if let Some(hooks) = &hooks {
                        hooks.on_run_start(&run_id).await;
                    }
                    executor.run().await;
                });
            }
        }

        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDescriptor;
    use crate::error::Result;
    use crate::graph::Node;
    use crate::provider::{ProviderEvent, ProviderEventStream, StreamParams};
    use async_trait::async_trait;

    struct OneChunk;

    #[async_trait]
    impl ProviderAdapter for OneChunk {
        async fn stream(&self, _params: StreamParams) -> Result<ProviderEventStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                ProviderEvent::Chunk {
                    content: "ok".to_string(),
                },
            )])))
        }
    }

    #[test]
    fn test_default_config() {
        let config = SwarmConfig::default();
        assert!(config.swarm_budget_cents.is_none());
        assert!(config.max_concurrent_agents.is_none());
        assert_eq!(config.scratchpad_max_key_bytes, 10 * 1024);
    }

    #[tokio::test]
    async fn test_validation_failure_yields_start_then_error() {
        let engine = SwarmEngine::new(Arc::new(OneChunk));

        let mut graph = SwarmGraph::new("bad");
        graph
            .add_node(Node::new("a", AgentDescriptor::new("a", "A", "w", "p")))
            .unwrap();
        graph.add_edge("a", "missing");

        let events = engine.execute(graph, "task").collect_all().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SwarmEvent::SwarmStart { .. }));
        match &events[1] {
            SwarmEvent::SwarmError {
                completed_nodes, ..
            } => assert!(completed_nodes.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_node_run() {
        let engine = SwarmEngine::new(Arc::new(OneChunk));

        let mut graph = SwarmGraph::new("solo");
        graph
            .add_node(Node::new("a", AgentDescriptor::new("a", "A", "w", "p")))
            .unwrap();

        let events = engine.execute(graph, "task").collect_all().await;
        assert!(matches!(events.first(), Some(SwarmEvent::SwarmStart { .. })));
        assert!(matches!(events.last(), Some(SwarmEvent::SwarmDone { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SwarmEvent::AgentDone { .. })));
    }
}
