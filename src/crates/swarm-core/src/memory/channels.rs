//! Directed and broadcast messaging between agents
//!
//! Channels are one append-only log of messages. Append order defines
//! causality; nothing is ever deleted. A message addressed to
//! [`BROADCAST`] reaches every agent's inbox.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recipient marker for broadcast messages
pub const BROADCAST: &str = "*";

/// One message in the shared log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Sender agent id
    pub from: String,
    /// Recipient agent id, or [`BROADCAST`]
    pub to: String,
    /// Message body
    pub content: String,
    /// Optional structured metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

/// Append-only shared message log
pub struct Channels {
    log: Mutex<Vec<ChannelMessage>>,
}

impl Channels {
    /// Create an empty log
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
        }
    }

    /// Append a directed message
    pub fn send(&self, from: &str, to: &str, content: &str, metadata: Option<Value>) {
        self.log.lock().push(ChannelMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
            metadata,
            timestamp: Utc::now(),
        });
    }

    /// Append a broadcast message
    pub fn broadcast(&self, from: &str, content: &str, metadata: Option<Value>) {
        self.send(from, BROADCAST, content, metadata);
    }

    /// Messages addressed to `agent_id`, including broadcasts, in
    /// append order
    pub fn inbox(&self, agent_id: &str) -> Vec<ChannelMessage> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.to == agent_id || m.to == BROADCAST)
            .cloned()
            .collect()
    }

    /// Directed messages between `a` and `b` in either direction
    pub fn conversation(&self, a: &str, b: &str) -> Vec<ChannelMessage> {
        self.log
            .lock()
            .iter()
            .filter(|m| (m.from == a && m.to == b) || (m.from == b && m.to == a))
            .cloned()
            .collect()
    }

    /// Snapshot of the whole log in append order
    pub fn snapshot(&self) -> Vec<ChannelMessage> {
        self.log.lock().clone()
    }

    /// Total messages in the log
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// True when no messages have been sent
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
