//! Shared memory for one run: scratchpad and channels
//!
//! Both structures live exactly as long as a run and are shared between
//! parallel node tasks behind an `Arc<SwarmMemory>`. Their interior
//! locks serialize mutation; reads are cheap snapshots.

pub mod channels;
pub mod scratchpad;

pub use channels::{ChannelMessage, Channels, BROADCAST};
pub use scratchpad::{Scratchpad, WriteOp, WriteRecord};

/// Scratchpad plus channels, created per run
pub struct SwarmMemory {
    /// Keyed store with byte quotas and write history
    pub scratchpad: Scratchpad,
    /// Directed/broadcast message log
    pub channels: Channels,
}

impl SwarmMemory {
    /// Create memory with default scratchpad quotas
    pub fn new() -> Self {
        Self {
            scratchpad: Scratchpad::new(),
            channels: Channels::new(),
        }
    }

    /// Create memory with explicit scratchpad quotas
    pub fn with_limits(max_key_bytes: usize, max_total_bytes: usize) -> Self {
        Self {
            scratchpad: Scratchpad::with_limits(max_key_bytes, max_total_bytes),
            channels: Channels::new(),
        }
    }
}

impl Default for SwarmMemory {
    fn default() -> Self {
        Self::new()
    }
}
