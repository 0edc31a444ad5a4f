//! Provider adapter traits and registry
//!
//! The engine is an orchestration layer, not an LLM client library: it
//! consumes providers through the [`ProviderAdapter`] trait and ships no
//! HTTP transports of its own. Implementations convert [`Message`]s to
//! their vendor wire format, open a streaming completion, and surface
//! the response as a lazy sequence of [`ProviderEvent`]s.
//!
//! # Contract
//!
//! - `stream` must honor the cancellation token in [`StreamParams`];
//!   a cancelled stream should end promptly (an `Err` item classified
//!   as a timeout is acceptable).
//! - `tool_use` events may appear any number of times per stream; the
//!   runner treats each as one round of the tool loop.
//! - A `usage` event should be emitted before the stream ends so cost
//!   accounting stays exact; streams without usage simply record zero.
//!
//! # Example
//!
//! ```rust,ignore
//! use swarm_core::provider::{ProviderAdapter, ProviderEvent, StreamParams};
//! use async_trait::async_trait;
//!
//! struct MyVendorAdapter { api_key: String }
//!
//! #[async_trait]
//! impl ProviderAdapter for MyVendorAdapter {
//!     async fn stream(&self, params: StreamParams) -> swarm_core::Result<ProviderEventStream> {
//!         // 1. Convert params.messages to the vendor format
//!         // 2. Open the SSE/streaming request
//!         // 3. Map vendor deltas to ProviderEvent items
//!         todo!()
//!     }
//! }
//! ```

use crate::cost::PricingTable;
use crate::error::Result;
use crate::messages::Message;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lazy sequence of provider events
pub type ProviderEventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send>>;

/// One streaming completion request
#[derive(Clone)]
pub struct StreamParams {
    /// Model identifier
    pub model: String,

    /// Conversation so far
    pub messages: Vec<Message>,

    /// Sampling temperature, when the agent sets one
    pub temperature: Option<f32>,

    /// Output token cap, when the agent sets one
    pub max_tokens: Option<u32>,

    /// Tool definitions the model may call
    pub tools: Vec<ToolDefinition>,

    /// Cooperative cancellation signal; adapters must stop streaming
    /// promptly once this trips
    pub signal: CancellationToken,
}

impl std::fmt::Debug for StreamParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParams")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// Events a provider stream may yield
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// A fragment of output text
    Chunk {
        /// Text delta
        content: String,
    },

    /// The model requested a tool invocation
    ToolUse {
        /// Provider-assigned call id
        id: String,
        /// Tool name
        name: String,
        /// Arguments object
        input: Value,
    },

    /// Token usage for the call (typically once, near the end)
    Usage {
        /// Prompt tokens consumed
        input_tokens: u64,
        /// Completion tokens produced
        output_tokens: u64,
    },
}

/// Context/output limits for a model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Total context window in tokens
    pub context_window: u32,
    /// Maximum output tokens per call
    pub max_output: u32,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            context_window: 200_000,
            max_output: 8_192,
        }
    }
}

/// Adapter to one LLM provider
///
/// `estimate_cost` and `get_model_limits` have table-driven defaults so
/// thin adapters only implement `stream`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Open a streaming completion
    async fn stream(&self, params: StreamParams) -> Result<ProviderEventStream>;

    /// Estimate the cost of a call in integer cents
    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> u64 {
        PricingTable::default().cost_cents(model, input_tokens, output_tokens)
    }

    /// Context and output limits for a model
    fn get_model_limits(&self, _model: &str) -> ModelLimits {
        ModelLimits::default()
    }
}

/// Registry mapping provider ids to adapters, with a default fallback
///
/// Resolution follows `registry[id] ?? default` for both agents and
/// LLM evaluators.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default: Arc<dyn ProviderAdapter>,
}

impl ProviderRegistry {
    /// Create a registry around a default provider
    pub fn new(default: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            providers: HashMap::new(),
            default,
        }
    }

    /// Register a named provider
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn ProviderAdapter>) {
        self.providers.insert(id.into(), provider);
    }

    /// True when `id` names a registered provider
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Resolve an optional provider id to an adapter
    pub fn resolve(&self, id: Option<&str>) -> Arc<dyn ProviderAdapter> {
        id.and_then(|id| self.providers.get(id).cloned())
            .unwrap_or_else(|| self.default.clone())
    }

    /// The default adapter
    pub fn default_provider(&self) -> Arc<dyn ProviderAdapter> {
        self.default.clone()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &ids)
            .finish()
    }
}
