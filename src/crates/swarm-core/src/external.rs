//! Optional external collaborators
//!
//! The core consumes these interfaces but ships no implementations:
//! entity context, semantic memory, codebase search, persona lookup,
//! persistence, and lifecycle hooks all live outside the engine. Every
//! method has a no-op default so adapters implement only what they
//! care about, and a missing adapter behaves exactly like a no-op one.
//!
//! Persistence is write-only from the core's perspective and hook
//! failures never affect the run outcome: the engine awaits each hook
//! but ignores anything it reports.

use crate::agent::PersonaConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Entity context lookup (priority 4 in context assembly)
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Context text for an entity, empty when unknown
    async fn get_context(&self, _entity_type: &str, _entity_id: &str) -> String {
        String::new()
    }
}

/// One semantic memory search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    /// Stored text
    pub text: String,
    /// Similarity score
    pub score: f64,
    /// Optional metadata recorded at store time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Semantic memory search and storage (priority 5 in context assembly)
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Top-k results for a query
    async fn search(&self, _query: &str, _k: usize) -> Vec<MemoryHit> {
        Vec::new()
    }

    /// Store a text with optional metadata
    async fn store(&self, _text: &str, _metadata: Option<Value>) {}
}

/// Depth of a codebase query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodebaseTier {
    /// Fast, shallow lookup
    Mini,
    /// Default depth
    Standard,
    /// Exhaustive search
    Full,
}

/// Codebase query results (priority 6 in context assembly)
#[async_trait]
pub trait CodebaseProvider: Send + Sync {
    /// Answer a query against a repository
    async fn query(&self, _repo_id: &str, _query: &str, _tier: CodebaseTier) -> String {
        String::new()
    }
}

/// Persona lookup by agent role
#[async_trait]
pub trait PersonaProvider: Send + Sync {
    /// The persona for a role, if one is configured
    async fn get_persona(&self, _role: &str) -> Option<PersonaConfig> {
        None
    }
}

/// Identity of one run, handed to persistence at start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Run identifier (uuid)
    pub run_id: String,
    /// Graph identifier
    pub dag_id: String,
    /// Nodes known at start
    pub node_count: usize,
}

/// Write-only persistence observer
///
/// The engine records run lifecycle, activity, and messages; it never
/// reads anything back. Failures are the adapter's concern.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// A run was created
    async fn create_run(&self, _record: &RunRecord) {}

    /// A run reached a terminal status ("done", "error", "cancelled")
    async fn update_run_status(&self, _run_id: &str, _status: &str) {}

    /// One event-sized activity entry
    async fn log_activity(&self, _run_id: &str, _entry: Value) {}

    /// One inter-agent message
    async fn log_message(&self, _run_id: &str, _message: Value) {}
}

/// Async lifecycle callbacks around a run
///
/// Hooks are awaited inline, so the event stream is delayed by no
/// more than the hook itself. Their failures are ignored.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// The run is about to execute
    async fn on_run_start(&self, _run_id: &str) {}

    /// The run finished with `swarm_done`
    async fn on_run_complete(&self, _run_id: &str) {}

    /// The run finished with `swarm_error` or `swarm_cancelled`
    async fn on_run_failed(&self, _run_id: &str, _message: &str) {}

    /// Final per-node results of a completed swarm
    async fn on_swarm_complete(&self, _swarm_id: &str, _results: &HashMap<String, String>) {}
}

/// Bundle of the optional context-side collaborators
///
/// `Default` gives the all-absent bundle; absent adapters contribute
/// nothing to context assembly.
#[derive(Clone, Default)]
pub struct ExternalAdapters {
    /// Entity context source
    pub context: Option<Arc<dyn ContextProvider>>,
    /// Semantic memory source
    pub memory: Option<Arc<dyn MemoryProvider>>,
    /// Codebase query source
    pub codebase: Option<Arc<dyn CodebaseProvider>>,
    /// Persona source
    pub persona: Option<Arc<dyn PersonaProvider>>,
}

impl std::fmt::Debug for ExternalAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalAdapters")
            .field("context", &self.context.is_some())
            .field("memory", &self.memory.is_some())
            .field("codebase", &self.codebase.is_some())
            .field("persona", &self.persona.is_some())
            .finish()
    }
}
