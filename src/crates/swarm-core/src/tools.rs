//! Coordination tool definitions
//!
//! The engine exposes a fixed toolset to every agent: message passing
//! and scratchpad access. Providers surface these definitions to the
//! model; the runner executes the calls locally against shared memory
//! and feeds the observation string back into the conversation.
//!
//! Tool execution never fails a node. Quota violations and unknown
//! tool names come back as human-readable error strings the model can
//! observe and react to.
//!
//! # Tool Names
//!
//! | Name | Effect |
//! |------|--------|
//! | `send_message` | Append a directed or broadcast message to Channels |
//! | `scratchpad_set` | Overwrite a scalar value (quota-checked) |
//! | `scratchpad_read` | Read a scalar value |
//! | `scratchpad_append` | Append to a list value (quota-checked) |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Name of the message-sending coordination tool
pub const TOOL_SEND_MESSAGE: &str = "send_message";
/// Name of the scalar-write coordination tool
pub const TOOL_SCRATCHPAD_SET: &str = "scratchpad_set";
/// Name of the scalar-read coordination tool
pub const TOOL_SCRATCHPAD_READ: &str = "scratchpad_read";
/// Name of the list-append coordination tool
pub const TOOL_SCRATCHPAD_APPEND: &str = "scratchpad_append";

/// Definition of a tool a model can call
///
/// The `parameters` field is a JSON Schema object describing the tool's
/// arguments, in the shape function-calling models expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,

    /// What the tool does; the model uses this to decide when to call it
    pub description: String,

    /// JSON Schema for the arguments object
    pub parameters: JsonValue,
}

impl ToolDefinition {
    /// Create a tool definition with an empty parameter schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    /// Set the parameter schema
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }
}

/// The fixed coordination toolset offered to every agent
pub fn coordination_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            TOOL_SEND_MESSAGE,
            "Send a message to another agent, or to every agent with '*'",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Recipient agent id, or '*' to broadcast"
                },
                "content": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["to", "content"]
        })),
        ToolDefinition::new(
            TOOL_SCRATCHPAD_SET,
            "Store a value in the shared scratchpad, overwriting any previous value at the key",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Scratchpad key"},
                "value": {"description": "Value to store (any JSON)"}
            },
            "required": ["key", "value"]
        })),
        ToolDefinition::new(
            TOOL_SCRATCHPAD_READ,
            "Read a value from the shared scratchpad",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Scratchpad key"}
            },
            "required": ["key"]
        })),
        ToolDefinition::new(
            TOOL_SCRATCHPAD_APPEND,
            "Append a value to a shared scratchpad list",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Scratchpad list key"},
                "value": {"description": "Value to append (any JSON)"}
            },
            "required": ["key", "value"]
        })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolset_is_fixed() {
        let tools = coordination_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                TOOL_SEND_MESSAGE,
                TOOL_SCRATCHPAD_SET,
                TOOL_SCRATCHPAD_READ,
                TOOL_SCRATCHPAD_APPEND,
            ]
        );
    }

    #[test]
    fn test_schemas_are_objects() {
        for tool in coordination_tools() {
            assert_eq!(tool.parameters["type"], "object", "tool {}", tool.name);
        }
    }

    #[test]
    fn test_send_message_requires_recipient() {
        let tools = coordination_tools();
        let send = tools.iter().find(|t| t.name == TOOL_SEND_MESSAGE).unwrap();
        let required = send.parameters["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "to"));
        assert!(required.iter().any(|v| v == "content"));
    }
}
