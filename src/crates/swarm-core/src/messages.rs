//! Message types for provider conversations
//!
//! The engine talks to providers in role-tagged messages. The context
//! assembler produces them, the agent runner appends assistant/tool
//! pairs while looping over tool calls, and provider adapters translate
//! them into their vendor wire format.
//!
//! ```rust
//! use swarm_core::messages::{Message, MessageRole};
//!
//! let system = Message::system("You are a reviewer.");
//! let user = Message::user("Review this patch.");
//! assert_eq!(system.role, MessageRole::System);
//! assert_eq!(user.text(), "Review this patch.");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of the message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions and assembled context for the model
    System,
    /// End-user input (the task)
    User,
    /// Model output, including tool-call requests
    Assistant,
    /// Result of a tool execution, fed back to the model
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result message
    pub id: String,
    /// Tool name (one of the coordination tools)
    pub name: String,
    /// Arguments as a JSON object
    pub input: Value,
}

/// A single message in a provider conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender
    pub role: MessageRole,

    /// Text content
    pub content: String,

    /// Tool calls recorded on assistant messages during the tool loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Call id this message answers (tool messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a tool result message answering `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Attach tool calls (assistant messages recording a tool round)
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    /// The text content of this message
    pub fn text(&self) -> &str {
        &self.content
    }
}
