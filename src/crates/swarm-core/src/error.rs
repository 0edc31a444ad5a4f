//! Error types and error handling for swarm execution
//!
//! This module defines all error types that can occur during graph
//! construction, validation, and execution. All errors implement
//! `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! SwarmError
//! ├── Configuration      - Graph construction errors (duplicate ids, bad refs)
//! ├── Validation         - Pre-flight structural errors (orphans, unbounded cycles)
//! ├── Provider           - Provider stream failures
//! ├── NodeExecution      - A node failed while running
//! ├── Quota              - Scratchpad byte-limit violations
//! ├── BudgetExceeded     - Cost budget exhausted
//! ├── DurationExceeded   - Swarm wall-clock limit exhausted
//! ├── Cancelled          - Cooperative cancellation
//! └── Serialization      - JSON errors
//! ```
//!
//! # Agent Error Taxonomy
//!
//! Failures surfaced on the event stream as `agent_error` carry an
//! [`AgentErrorType`] classified from the underlying error message:
//!
//! ```rust
//! use swarm_core::error::AgentErrorType;
//!
//! assert_eq!(AgentErrorType::classify("HTTP 429 too many requests"), AgentErrorType::RateLimit);
//! assert_eq!(AgentErrorType::classify("connection reset: ECONNREFUSED"), AgentErrorType::NetworkError);
//! assert_eq!(AgentErrorType::classify("something odd"), AgentErrorType::Unknown);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type using [`SwarmError`]
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors produced by the swarm engine
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Graph construction error (duplicate node ids, references to
    /// unknown nodes, malformed evaluator targets)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Pre-flight validation failure; the run aborts before any node
    /// starts
    #[error("Validation error: {0}")]
    Validation(String),

    /// A provider stream failed or refused the request
    #[error("Provider error: {0}")]
    Provider(String),

    /// A node failed during execution
    #[error("Node '{node}' failed: {message}")]
    NodeExecution {
        /// Node that failed
        node: String,
        /// Underlying error message
        message: String,
    },

    /// A scratchpad write would violate a byte quota
    #[error("Quota error: {0}")]
    Quota(String),

    /// The swarm or per-agent cost budget is exhausted
    #[error("Budget exceeded: {used}¢ used of {limit}¢ limit")]
    BudgetExceeded {
        /// Cents spent so far
        used: u64,
        /// The configured limit in cents
        limit: u64,
    },

    /// The swarm wall-clock duration limit elapsed
    #[error("Swarm duration exceeded {limit_ms}ms")]
    DurationExceeded {
        /// Configured limit in milliseconds
        limit_ms: u64,
    },

    /// The run was cancelled cooperatively
    #[error("Swarm cancelled")]
    Cancelled,

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SwarmError {
    /// Build a provider error from anything displayable
    pub fn provider(message: impl std::fmt::Display) -> Self {
        Self::Provider(message.to_string())
    }
}

/// Classification of agent failures for the `agent_error` event
///
/// The classification is message-based: the runner inspects the error
/// text of a failed provider stream and maps it onto this taxonomy so
/// monitors can aggregate failures without parsing provider-specific
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorType {
    /// Aborted, timed out, or deadline exceeded
    Timeout,
    /// HTTP 429 or provider-side throttling
    RateLimit,
    /// HTTP 401/403 or credential failures
    AuthError,
    /// Connection-level failures (fetch, DNS, ECONN*)
    NetworkError,
    /// Provider refused the content (policy, filter, moderation)
    ContentFilter,
    /// A cost budget was exhausted
    BudgetExceeded,
    /// Anything not matched by the above
    Unknown,
}

impl AgentErrorType {
    /// Classify an error message into the agent error taxonomy
    ///
    /// Matching is case-insensitive and keyword-based. The order of the
    /// checks matters: budget and auth phrases are looked for before the
    /// broader network keywords so messages like "budget exceeded while
    /// fetching" land in the more specific bucket.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("budget") {
            return Self::BudgetExceeded;
        }
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
            return Self::RateLimit;
        }
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("auth")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("api key")
        {
            return Self::AuthError;
        }
        if lower.contains("abort")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("deadline")
            || lower.contains("cancel")
        {
            return Self::Timeout;
        }
        if lower.contains("policy")
            || lower.contains("filter")
            || lower.contains("moderation")
            || lower.contains("content management")
        {
            return Self::ContentFilter;
        }
        if lower.contains("fetch")
            || lower.contains("network")
            || lower.contains("econn")
            || lower.contains("connection")
            || lower.contains("dns")
        {
            return Self::NetworkError;
        }

        Self::Unknown
    }
}

impl std::fmt::Display for AgentErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::AuthError => "auth_error",
            Self::NetworkError => "network_error",
            Self::ContentFilter => "content_filter",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
