//! Shared scratchpad with byte quotas and write history
//!
//! The scratchpad is a keyed store agents coordinate through. One key
//! namespace backs two logically disjoint tables: scalar values written
//! with `set` and list values written with `append`. `get` never sees
//! list entries and `get_list` never sees scalars; a key may carry both
//! at once. This split is a contract, not an accident: callers choose
//! the table by the operation they use.
//!
//! Byte accounting is transactional with respect to the quota checks: a
//! write that would violate the per-key or total limit fails with a
//! quota error and leaves the store untouched. Every successful write
//! appends a [`WriteRecord`] to the key's history.

use crate::error::{Result, SwarmError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default per-value byte limit (10 KiB)
pub const DEFAULT_MAX_KEY_BYTES: usize = 10 * 1024;
/// Default total byte limit (100 KiB)
pub const DEFAULT_MAX_TOTAL_BYTES: usize = 100 * 1024;

/// Which operation produced a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    /// Scalar overwrite
    Set,
    /// List append
    Append,
}

/// One entry in a key's write history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Key written
    pub key: String,
    /// Value as written
    pub value: Value,
    /// Agent id of the writer
    pub written_by: String,
    /// When the write landed
    pub timestamp: DateTime<Utc>,
    /// Operation used
    pub operation: WriteOp,
}

struct Stored {
    value: Value,
    bytes: usize,
}

#[derive(Default)]
struct Tables {
    scalars: HashMap<String, Stored>,
    lists: HashMap<String, Vec<Stored>>,
    history: HashMap<String, Vec<WriteRecord>>,
    current_bytes: usize,
}

/// Keyed value store with byte quotas, shared across agents
pub struct Scratchpad {
    max_key_bytes: usize,
    max_total_bytes: usize,
    tables: Mutex<Tables>,
}

impl Scratchpad {
    /// Create a scratchpad with the default quotas
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_KEY_BYTES, DEFAULT_MAX_TOTAL_BYTES)
    }

    /// Create a scratchpad with explicit quotas
    pub fn with_limits(max_key_bytes: usize, max_total_bytes: usize) -> Self {
        Self {
            max_key_bytes,
            max_total_bytes,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Store a scalar value, overwriting any previous value at `key`
    pub fn set(&self, key: &str, value: Value, writer: &str) -> Result<()> {
        let bytes = serialized_len(&value)?;
        if bytes > self.max_key_bytes {
            return Err(SwarmError::Quota(format!(
                "value for key '{}' is {} bytes, exceeding the {}-byte per-key limit",
                key, bytes, self.max_key_bytes
            )));
        }

        let mut tables = self.tables.lock();
        let previous = tables.scalars.get(key).map(|s| s.bytes).unwrap_or(0);
        let total_after = tables.current_bytes - previous + bytes;
        if total_after > self.max_total_bytes {
            return Err(SwarmError::Quota(format!(
                "writing key '{}' would use {} bytes, exceeding the {}-byte total limit",
                key, total_after, self.max_total_bytes
            )));
        }

        tables.scalars.insert(
            key.to_string(),
            Stored {
                value: value.clone(),
                bytes,
            },
        );
        tables.current_bytes = total_after;
        tables
            .history
            .entry(key.to_string())
            .or_default()
            .push(WriteRecord {
                key: key.to_string(),
                value,
                written_by: writer.to_string(),
                timestamp: Utc::now(),
                operation: WriteOp::Set,
            });
        Ok(())
    }

    /// Append a value to the list stored at `key`
    pub fn append(&self, key: &str, value: Value, writer: &str) -> Result<()> {
        let bytes = serialized_len(&value)?;
        if bytes > self.max_key_bytes {
            return Err(SwarmError::Quota(format!(
                "value appended to key '{}' is {} bytes, exceeding the {}-byte per-key limit",
                key, bytes, self.max_key_bytes
            )));
        }

        let mut tables = self.tables.lock();
        let total_after = tables.current_bytes + bytes;
        if total_after > self.max_total_bytes {
            return Err(SwarmError::Quota(format!(
                "appending to key '{}' would use {} bytes, exceeding the {}-byte total limit",
                key, total_after, self.max_total_bytes
            )));
        }

        tables.lists.entry(key.to_string()).or_default().push(Stored {
            value: value.clone(),
            bytes,
        });
        tables.current_bytes = total_after;
        tables
            .history
            .entry(key.to_string())
            .or_default()
            .push(WriteRecord {
                key: key.to_string(),
                value,
                written_by: writer.to_string(),
                timestamp: Utc::now(),
                operation: WriteOp::Append,
            });
        Ok(())
    }

    /// The scalar value at `key`, if any
    pub fn get(&self, key: &str) -> Option<Value> {
        self.tables.lock().scalars.get(key).map(|s| s.value.clone())
    }

    /// The list value at `key`; empty when nothing was appended
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        self.tables
            .lock()
            .lists
            .get(key)
            .map(|entries| entries.iter().map(|s| s.value.clone()).collect())
            .unwrap_or_default()
    }

    /// All keys across both tables, sorted
    pub fn keys(&self) -> Vec<String> {
        let tables = self.tables.lock();
        let mut keys: Vec<String> = tables
            .scalars
            .keys()
            .chain(tables.lists.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Write history for `key`, oldest first
    pub fn history(&self, key: &str) -> Vec<WriteRecord> {
        self.tables
            .lock()
            .history
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Bytes currently held across both tables
    pub fn current_bytes(&self) -> usize {
        self.tables.lock().current_bytes
    }

    /// Render live entries into the block injected into agent context
    ///
    /// Returns an empty string when the scratchpad holds nothing.
    pub fn to_context_string(&self) -> String {
        let tables = self.tables.lock();
        if tables.scalars.is_empty() && tables.lists.is_empty() {
            return String::new();
        }

        let mut keys: Vec<&String> = tables
            .scalars
            .keys()
            .chain(tables.lists.keys())
            .collect();
        keys.sort();
        keys.dedup();

        let mut out = String::from("Shared scratchpad:\n");
        for key in keys {
            if let Some(stored) = tables.scalars.get(key) {
                out.push_str(&format!("- {} = {}\n", key, compact(&stored.value)));
            }
            if let Some(list) = tables.lists.get(key) {
                let rendered: Vec<String> = list.iter().map(|s| compact(&s.value)).collect();
                out.push_str(&format!("- {} (list) = [{}]\n", key, rendered.join(", ")));
            }
        }
        out.trim_end().to_string()
    }
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new()
    }
}

fn serialized_len(value: &Value) -> Result<usize> {
    Ok(serde_json::to_string(value)?.len())
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get_round_trip() {
        let pad = Scratchpad::new();
        pad.set("plan", json!({"step": 1}), "agent-a").unwrap();
        assert_eq!(pad.get("plan"), Some(json!({"step": 1})));
    }

    #[test]
    fn test_set_overwrites() {
        let pad = Scratchpad::new();
        pad.set("k", json!("first"), "a").unwrap();
        pad.set("k", json!("second"), "a").unwrap();
        assert_eq!(pad.get("k"), Some(json!("second")));
        assert_eq!(pad.history("k").len(), 2);
    }

    #[test]
    fn test_scalar_and_list_tables_are_disjoint() {
        let pad = Scratchpad::new();
        pad.set("k", json!("scalar"), "a").unwrap();
        pad.append("k", json!("item"), "a").unwrap();

        assert_eq!(pad.get("k"), Some(json!("scalar")));
        assert_eq!(pad.get_list("k"), vec![json!("item")]);
        assert_eq!(pad.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_per_key_quota() {
        let pad = Scratchpad::with_limits(10, 1000);
        let err = pad.set("k", json!("a very long string value"), "a");
        assert!(matches!(err, Err(SwarmError::Quota(_))));
        assert_eq!(pad.get("k"), None);
        assert_eq!(pad.current_bytes(), 0);
        assert!(pad.history("k").is_empty());
    }

    #[test]
    fn test_total_quota_rejects_without_mutating() {
        let pad = Scratchpad::with_limits(100, 20);
        pad.set("a", json!("0123456789"), "w").unwrap(); // 12 bytes serialized
        let before = pad.current_bytes();

        let err = pad.set("b", json!("0123456789"), "w");
        assert!(matches!(err, Err(SwarmError::Quota(_))));
        assert_eq!(pad.current_bytes(), before);
        assert_eq!(pad.get("b"), None);
    }

    #[test]
    fn test_overwrite_reclaims_bytes() {
        let pad = Scratchpad::with_limits(100, 20);
        pad.set("a", json!("0123456789"), "w").unwrap();
        // Overwriting with a same-size value stays within the total.
        pad.set("a", json!("9876543210"), "w").unwrap();
        assert_eq!(pad.current_bytes(), 12);
    }

    #[test]
    fn test_byte_accounting_matches_live_entries() {
        let pad = Scratchpad::new();
        pad.set("a", json!("xy"), "w").unwrap(); // "\"xy\"" = 4 bytes
        pad.append("b", json!(7), "w").unwrap(); // "7" = 1 byte
        pad.append("b", json!(42), "w").unwrap(); // "42" = 2 bytes
        assert_eq!(pad.current_bytes(), 7);
    }

    #[test]
    fn test_history_records_operations() {
        let pad = Scratchpad::new();
        pad.set("k", json!(1), "alpha").unwrap();
        pad.append("k", json!(2), "beta").unwrap();

        let history = pad.history("k");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation, WriteOp::Set);
        assert_eq!(history[0].written_by, "alpha");
        assert_eq!(history[1].operation, WriteOp::Append);
        assert_eq!(history[1].written_by, "beta");
    }

    #[test]
    fn test_context_string() {
        let pad = Scratchpad::new();
        assert_eq!(pad.to_context_string(), "");

        pad.set("goal", json!("ship"), "a").unwrap();
        pad.append("notes", json!("n1"), "a").unwrap();

        let rendered = pad.to_context_string();
        assert!(rendered.contains("goal = \"ship\""));
        assert!(rendered.contains("notes (list) = [\"n1\"]"));
    }
}
