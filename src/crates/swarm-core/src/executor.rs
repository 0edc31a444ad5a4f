//! The swarm executor: main scheduling loop and post-completion effects
//!
//! The executor drives one run to termination. Each loop iteration
//! checks cancellation and the duration limit, picks the ready batch,
//! runs it (sequentially for one node, concurrently for several),
//! applies post-completion effects (conditional routing, bounded
//! cycles, dynamic expansion), and enforces the swarm budget. The
//! stream always ends with exactly one of `swarm_done`, `swarm_error`,
//! or `swarm_cancelled`.
//!
//! # Batch event ordering
//!
//! A single-node batch streams its events live. A parallel batch
//! buffers per node, awaits all tasks, then flushes each node's buffer
//! in ascending node-id order; one `swarm_progress` follows the batch,
//! then the batch's routing and cycle events. This keeps every
//! within-node sequence contiguous and makes cross-batch ordering
//! deterministic.
//!
//! # Ownership
//!
//! The executor owns the graph and scheduler outright: all mutation,
//! including appending a coordinator's sub-graph and registering its
//! nodes, happens inside the single loop task, so a newly introduced
//! pending node is always visible to the next readiness computation.

use crate::cost::CostTracker;
use crate::error::AgentErrorType;
use crate::events::{EventSender, EventStream, SwarmEvent};
use crate::external::{ExternalAdapters, LifecycleHooks, PersistenceAdapter};
use crate::graph::{ConditionalEdge, Evaluator, NodeId, SubDag, SwarmGraph};
use crate::memory::SwarmMemory;
use crate::messages::Message;
use crate::provider::{ProviderEvent, ProviderRegistry, StreamParams};
use crate::runner::{AgentRunner, RunnerOutcome, RunnerRequest};
use crate::scheduler::{NodeStatus, Scheduler};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the executor needs beyond the graph and task
pub struct ExecutorOptions {
    /// Provider registry with default fallback
    pub registry: ProviderRegistry,
    /// Shared cost tracker with budgets
    pub cost: Arc<CostTracker>,
    /// Shared scratchpad and channels
    pub memory: Arc<SwarmMemory>,
    /// Optional context-side collaborators
    pub externals: ExternalAdapters,
    /// Model used when an agent names none
    pub default_model: String,
    /// Repository id for codebase context queries
    pub repo_id: Option<String>,
    /// Concurrency cap; `None` is unbounded
    pub max_concurrent_agents: Option<usize>,
    /// Wall-clock limit for the whole run
    pub max_swarm_duration: Option<Duration>,
    /// Cooperative cancellation signal
    pub signal: CancellationToken,
    /// Run identifier for persistence and hooks
    pub run_id: String,
    /// Write-only persistence observer
    pub persistence: Option<Arc<dyn PersistenceAdapter>>,
    /// Lifecycle callbacks
    pub hooks: Option<Arc<dyn LifecycleHooks>>,
}

/// Drives one run to termination
pub struct SwarmExecutor {
    graph: SwarmGraph,
    scheduler: Scheduler,
    runner: Arc<AgentRunner>,
    registry: ProviderRegistry,
    cost: Arc<CostTracker>,
    memory: Arc<SwarmMemory>,
    task: String,
    max_swarm_duration: Option<Duration>,
    signal: CancellationToken,
    events: EventSender,
    run_id: String,
    persistence: Option<Arc<dyn PersistenceAdapter>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    conditionally_blocked: HashSet<NodeId>,
    latest_outputs: HashMap<NodeId, String>,
}

impl SwarmExecutor {
    /// Build an executor for one run
    pub fn new(graph: SwarmGraph, task: String, events: EventSender, options: ExecutorOptions) -> Self {
        let scheduler = Scheduler::from_graph(&graph, options.max_concurrent_agents);
        let conditionally_blocked = graph.conditional_targets();
        let runner = Arc::new(AgentRunner::new(
            options.memory.clone(),
            options.cost.clone(),
            options.externals,
            options.default_model,
            options.repo_id,
        ));

        Self {
            graph,
            scheduler,
            runner,
            registry: options.registry,
            cost: options.cost,
            memory: options.memory,
            task,
            max_swarm_duration: options.max_swarm_duration,
            signal: options.signal,
            events,
            run_id: options.run_id,
            persistence: options.persistence,
            hooks: options.hooks,
            conditionally_blocked,
            latest_outputs: HashMap::new(),
        }
    }

    /// Execute the run; emits every event and exactly one terminal
    pub async fn run(mut self) {
        let started = Instant::now();
        info!(run_id = %self.run_id, dag = %self.graph.id, "swarm run started");

        loop {
            // Dropping the stream is a cooperative cancel too.
            if self.signal.is_cancelled() || self.events.is_closed() {
                self.finish_cancelled().await;
                return;
            }

            if let Some(limit) = self.max_swarm_duration {
                if started.elapsed() >= limit {
                    self.finish_error(format!(
                        "Swarm duration exceeded {}ms",
                        limit.as_millis()
                    ))
                    .await;
                    return;
                }
            }

            let ready: Vec<NodeId> = self
                .scheduler
                .ready_nodes(&self.graph)
                .into_iter()
                .filter(|id| !self.conditionally_blocked.contains(id))
                .collect();

            if ready.is_empty() {
                if self.scheduler.is_done() {
                    break;
                }
                if self.sweep_blocked() == 0 {
                    warn!(run_id = %self.run_id, "no ready nodes and nothing to skip; breaking");
                    break;
                }
                continue;
            }

            let outcomes = self.run_batch(ready).await;
            self.apply_outcomes(outcomes).await;

            let status = self.cost.check_budget();
            if !status.ok {
                if let Some(limit) = self.cost.swarm_budget() {
                    self.events.send(SwarmEvent::BudgetExceeded {
                        used: status.used,
                        limit,
                    });
                }
                self.finish_error("Budget exceeded".to_string()).await;
                return;
            }

            if let Some(warning) = self.cost.take_warning() {
                self.events.send(SwarmEvent::BudgetWarning {
                    used: warning.used,
                    limit: warning.limit,
                    percent_used: warning.percent_used,
                });
            }
        }

        self.finish_done().await;
    }

    /// Run one batch of ready nodes; returns outcomes in node-id order
    async fn run_batch(&mut self, batch: Vec<NodeId>) -> Vec<(NodeId, RunnerOutcome)> {
        debug!(run_id = %self.run_id, batch = ?batch, "running batch");

        if batch.len() == 1 {
            let id = batch.into_iter().next().expect("batch has one node");
            self.scheduler.mark_running(&id);
            let (request, provider) = self.prepare(&id);
            let outcome = self
                .runner
                .run(request, provider, &self.events, &self.signal)
                .await;
            return vec![(id, outcome)];
        }

        // Parallel batch: one task per node, events buffered per node.
        let mut tasks = Vec::with_capacity(batch.len());
        for id in batch {
            self.scheduler.mark_running(&id);
            let (request, provider) = self.prepare(&id);
            let runner = self.runner.clone();
            let signal = self.signal.clone();
            let (buffer_tx, buffer_rx) = EventStream::channel();
            let handle = tokio::spawn(async move {
                runner.run(request, provider, &buffer_tx, &signal).await
            });
            tasks.push((id, buffer_rx, handle));
        }

        // Await all tasks, then flush buffers in node-id order (the
        // batch arrives sorted from the scheduler).
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (id, buffer_rx, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => RunnerOutcome::Failed {
                    message: format!("node task failed: {}", join_err),
                    error_type: AgentErrorType::Unknown,
                },
            };
            for event in buffer_rx.collect_all().await {
                self.events.send(event);
            }
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Build the runner request and resolve the provider for a node
    fn prepare(&self, id: &str) -> (RunnerRequest, Arc<dyn crate::provider::ProviderAdapter>) {
        let node = self.graph.get_node(id).expect("scheduled node exists");

        let mut sources: Vec<NodeId> = self
            .graph
            .incoming_edges(id)
            .iter()
            .map(|e| e.from.clone())
            .collect();
        sources.sort();
        sources.dedup();

        let upstream_outputs: Vec<(NodeId, String)> = sources
            .into_iter()
            .filter_map(|from| {
                self.latest_outputs
                    .get(&from)
                    .map(|output| (from, output.clone()))
            })
            .collect();

        let request = RunnerRequest {
            node_id: id.to_string(),
            agent: node.agent.clone(),
            task: node.task.clone().unwrap_or_else(|| self.task.clone()),
            upstream_outputs,
        };
        let provider = self.registry.resolve(node.agent.provider_id.as_deref());
        (request, provider)
    }

    /// Record outcomes, emit progress, then apply per-node effects
    async fn apply_outcomes(&mut self, outcomes: Vec<(NodeId, RunnerOutcome)>) {
        for (id, outcome) in &outcomes {
            match outcome {
                RunnerOutcome::Completed { output } => {
                    self.scheduler.mark_completed(id);
                    self.latest_outputs.insert(id.clone(), output.clone());
                }
                RunnerOutcome::Failed { .. } => {
                    self.scheduler.mark_failed(id);
                }
            }
        }

        self.events.send(SwarmEvent::SwarmProgress {
            completed: self.scheduler.completed_count(),
            total: self.graph.node_count(),
            running_nodes: Vec::new(),
        });

        for (id, outcome) in outcomes {
            if let Some(persistence) = &self.persistence {
                let entry = match &outcome {
                    RunnerOutcome::Completed { .. } => {
                        serde_json::json!({"node": id, "status": "completed"})
                    }
                    RunnerOutcome::Failed { message, .. } => {
                        serde_json::json!({"node": id, "status": "failed", "error": message})
                    }
                };
                persistence.log_activity(&self.run_id, entry).await;
            }

            match outcome {
                RunnerOutcome::Completed { output } => {
                    self.post_completion(&id, &output).await;
                }
                RunnerOutcome::Failed { .. } => {
                    self.cascade_skip_from(&id);
                }
            }
        }
    }

    /// Effects applied when a node completes, in order: per-agent
    /// budget, conditional routing, cycle handling, dynamic expansion
    async fn post_completion(&mut self, id: &str, output: &str) {
        if let Some(node) = self.graph.get_node(id) {
            if let Some((used, limit)) = self.cost.agent_over_budget(&node.agent.id) {
                self.events.send(SwarmEvent::BudgetExceeded { used, limit });
            }
        }

        let conditional: Vec<ConditionalEdge> = self
            .graph
            .conditional_edges_from(id)
            .into_iter()
            .cloned()
            .collect();
        for edge in conditional {
            self.resolve_conditional(edge, output).await;
        }

        self.handle_cycles(id);

        let is_coordinator = self
            .graph
            .get_node(id)
            .map(|n| n.can_emit_dag)
            .unwrap_or(false);
        if is_coordinator {
            self.expand_graph(id, output);
        }
    }

    /// Resolve one conditional edge against the completed output
    async fn resolve_conditional(&mut self, edge: ConditionalEdge, output: &str) {
        let verdict = self.evaluate(&edge, output).await;

        // The verdict may be a label or a direct node id.
        let selected: Option<(String, NodeId)> = match verdict {
            Some(label) => {
                if let Some(target) = edge.targets.get(&label) {
                    Some((label, target.clone()))
                } else {
                    edge.targets
                        .iter()
                        .find(|(_, target)| **target == label)
                        .map(|(reason, target)| (reason.clone(), target.clone()))
                }
            }
            None => None,
        };

        match selected {
            Some((reason, target)) => {
                self.conditionally_blocked.remove(&target);
                for other in edge.targets.values() {
                    if *other != target {
                        self.skip_with_cascade(other.clone());
                    }
                }
                info!(from = %edge.from, to = %target, reason = %reason, "route decided");
                self.events.send(SwarmEvent::RouteDecision {
                    from_node: edge.from,
                    to_node: target,
                    reason,
                });
            }
            None => {
                debug!(from = %edge.from, "no route target chosen; skipping all targets");
                for target in edge.targets.values() {
                    self.skip_with_cascade(target.clone());
                }
            }
        }
    }

    /// Produce the routing label for one conditional edge
    async fn evaluate(&self, edge: &ConditionalEdge, output: &str) -> Option<String> {
        match &edge.evaluate {
            Evaluator::Rule(f) => Some(f(output)),
            Evaluator::Regex {
                pattern,
                match_target,
                else_target,
            } => {
                if pattern.is_match(output) {
                    Some(match_target.clone())
                } else {
                    Some(else_target.clone())
                }
            }
            Evaluator::Llm {
                prompt,
                model,
                provider_id,
            } => {
                let provider = self.registry.resolve(provider_id.as_deref());
                let model = model
                    .clone()
                    .unwrap_or_else(|| self.runner_default_model());
                let labels: Vec<&str> = edge.targets.keys().map(String::as_str).collect();
                let system = format!(
                    "{}\n\nRespond with exactly one of: {}",
                    prompt,
                    labels.join(", ")
                );
                let params = StreamParams {
                    model: model.clone(),
                    messages: vec![Message::system(system), Message::user(output)],
                    temperature: None,
                    max_tokens: None,
                    tools: Vec::new(),
                    signal: self.signal.clone(),
                };

                let mut stream = match provider.stream(params).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(from = %edge.from, "llm evaluator failed: {}", err);
                        return None;
                    }
                };

                let mut text = String::new();
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(ProviderEvent::Chunk { content }) => text.push_str(&content),
                        Ok(ProviderEvent::Usage {
                            input_tokens,
                            output_tokens,
                        }) => {
                            // Evaluator usage is attributed to the
                            // routing node's agent.
                            if let Some(node) = self.graph.get_node(&edge.from) {
                                self.cost.record(
                                    &node.agent.id,
                                    &edge.from,
                                    &model,
                                    input_tokens,
                                    output_tokens,
                                );
                            }
                        }
                        Ok(ProviderEvent::ToolUse { .. }) => {}
                        Err(err) => {
                            warn!(from = %edge.from, "llm evaluator stream failed: {}", err);
                            return None;
                        }
                    }
                }
                let label = text.trim().trim_matches('"').to_string();
                (!label.is_empty()).then_some(label)
            }
        }
    }

    fn runner_default_model(&self) -> String {
        // The default model also serves LLM evaluators without one.
        self.runner.default_model().to_string()
    }

    /// Cycle handling for every incoming feedback edge of a completed
    /// node
    fn handle_cycles(&mut self, id: &str) {
        let feedback: Vec<(NodeId, u32)> = self
            .graph
            .incoming_edges(id)
            .iter()
            .filter_map(|e| e.max_cycles.map(|max| (e.from.clone(), max)))
            .collect();

        for (from, max_iterations) in feedback {
            let iteration = self.scheduler.increment_cycle_count(&from, id);
            self.events.send(SwarmEvent::LoopIteration {
                node_id: id.to_string(),
                iteration,
                max_iterations,
            });
            if iteration < max_iterations {
                self.scheduler.reset_node_for_cycle(id);
            }
        }
    }

    /// Append a coordinator's sub-graph and register its nodes
    ///
    /// Graph mutation and scheduler registration stay in one critical
    /// section: both live on this task, so the new pending nodes are
    /// visible to the very next readiness computation.
    fn expand_graph(&mut self, id: &str, output: &str) {
        let Some(subdag) = SubDag::parse(output) else {
            return;
        };

        let mut added_nodes = 0usize;
        for node in subdag.nodes {
            let node_id = node.id.clone();
            if self.graph.add_node(node).is_err() {
                debug!(node = %node_id, "dynamic node rejected: duplicate id");
                continue;
            }
            if self.scheduler.register_node(node_id.clone()).is_err() {
                continue;
            }
            added_nodes += 1;
        }

        let mut added_edges = 0usize;
        for edge in subdag.edges {
            if self.graph.get_node(&edge.from).is_none() || self.graph.get_node(&edge.to).is_none()
            {
                debug!(from = %edge.from, to = %edge.to, "dynamic edge rejected: unknown endpoint");
                continue;
            }
            self.graph.push_edge(edge);
            added_edges += 1;
        }

        if added_nodes > 0 || added_edges > 0 {
            info!(
                coordinator = %id,
                nodes = added_nodes,
                edges = added_edges,
                "graph expanded"
            );
        }
    }

    /// Skip a node and cascade through everything reachable from it
    fn skip_with_cascade(&mut self, root: NodeId) {
        self.scheduler.mark_skipped(&root);
        self.conditionally_blocked.remove(&root);
        self.cascade_skip_from(&root);
    }

    /// Cascade-skip all reachable descendants of a failed or skipped
    /// node, through regular and conditional edges
    fn cascade_skip_from(&mut self, root: &str) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = self.descendants(root);

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            self.scheduler.mark_skipped(&id);
            self.conditionally_blocked.remove(&id);
            stack.extend(self.descendants(&id));
        }
    }

    fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut next: Vec<NodeId> = self
            .graph
            .outgoing_edges(id)
            .iter()
            .map(|e| e.to.clone())
            .collect();
        for cond in self.graph.conditional_edges_from(id) {
            next.extend(cond.targets.values().cloned());
        }
        next
    }

    /// Skip pending nodes gated by failed or skipped dependencies,
    /// propagating until a fixpoint; returns how many were skipped
    fn sweep_blocked(&mut self) -> usize {
        let mut swept = 0;
        loop {
            let mut changed = false;
            for id in self.scheduler.pending_nodes() {
                let gated = self.graph.incoming_edges(&id).iter().any(|e| {
                    matches!(
                        self.scheduler.status(&e.from),
                        Some(NodeStatus::Failed) | Some(NodeStatus::Skipped)
                    )
                });
                if gated && self.scheduler.mark_skipped(&id) {
                    self.conditionally_blocked.remove(&id);
                    swept += 1;
                    changed = true;
                }
            }
            if !changed {
                return swept;
            }
        }
    }

    /// Results of every currently-completed node
    fn results(&self) -> HashMap<NodeId, String> {
        self.scheduler
            .completed_nodes()
            .into_iter()
            .filter_map(|id| {
                self.latest_outputs
                    .get(&id)
                    .map(|output| (id.clone(), output.clone()))
            })
            .collect()
    }

    async fn finish_done(&mut self) {
        let results = self.results();
        info!(run_id = %self.run_id, nodes = results.len(), "swarm run complete");

        self.events.send(SwarmEvent::SwarmDone {
            results: results.clone(),
            total_cost: self.cost.totals(),
        });

        self.flush_message_log().await;
        if let Some(persistence) = &self.persistence {
            persistence.update_run_status(&self.run_id, "done").await;
        }
        if let Some(hooks) = &self.hooks {
            hooks.on_run_complete(&self.run_id).await;
            hooks.on_swarm_complete(&self.graph.id, &results).await;
        }
    }

    async fn finish_error(&mut self, message: String) {
        warn!(run_id = %self.run_id, "swarm run failed: {}", message);
        self.events.send(SwarmEvent::SwarmError {
            message: message.clone(),
            completed_nodes: self.scheduler.completed_nodes(),
            partial_cost: self.cost.totals(),
        });

        self.flush_message_log().await;
        if let Some(persistence) = &self.persistence {
            persistence.update_run_status(&self.run_id, "error").await;
        }
        if let Some(hooks) = &self.hooks {
            hooks.on_run_failed(&self.run_id, &message).await;
        }
    }

    async fn finish_cancelled(&mut self) {
        info!(run_id = %self.run_id, "swarm run cancelled");
        self.events.send(SwarmEvent::SwarmCancelled {
            completed_nodes: self.scheduler.completed_nodes(),
            partial_cost: self.cost.totals(),
        });

        self.flush_message_log().await;
        if let Some(persistence) = &self.persistence {
            persistence
                .update_run_status(&self.run_id, "cancelled")
                .await;
        }
        if let Some(hooks) = &self.hooks {
            hooks.on_run_failed(&self.run_id, "cancelled").await;
        }
    }

    /// Hand the channel log to persistence at the end of the run
    async fn flush_message_log(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        for message in self.memory.channels.snapshot() {
            if let Ok(value) = serde_json::to_value(&message) {
                persistence.log_message(&self.run_id, value).await;
            }
        }
    }
}
