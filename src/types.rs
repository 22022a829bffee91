//! Core types shared across the buffer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a subscriber, assigned in registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a writer does when a subscriber's delivery queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the subscriber's queue has room.
    ///
    /// Nothing is lost while the subscriber stays active, but one slow
    /// subscriber stalls every writer.
    #[default]
    Block,

    /// Skip the new value for the full subscriber only.
    DropValue,

    /// Cancel and remove the full subscriber.
    DropSubscriber,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropValue => "drop_value",
            OverflowPolicy::DropSubscriber => "drop_subscriber",
        };
        f.write_str(name)
    }
}

/// Point-in-time counters for a buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Maximum number of retained values.
    pub capacity: usize,
    /// Number of values currently retained.
    pub len: usize,
    /// Values ever written.
    pub total_written: u64,
    /// Values pushed out of history by newer writes.
    pub evicted: u64,
    /// Subscribers currently registered.
    pub active_subscribers: usize,
    /// Values skipped for a subscriber under [`OverflowPolicy::DropValue`].
    pub dropped_values: u64,
    /// Subscribers removed under [`OverflowPolicy::DropSubscriber`].
    pub dropped_subscribers: u64,
    /// Subscribers whose callback panicked.
    pub panicked_subscribers: u64,
}
