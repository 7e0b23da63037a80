//! Shard lifecycle events delivered to the pool's owner

use serde_json::Value;

/// Lifecycle and dispatch notifications from one shard
///
/// Delivered through the pool's event channel in per-shard receive order.
/// Transport-internal failures never appear here as errors; they collapse
/// into `ConnectionLost` and the shard recovers on its own.
#[derive(Debug, Clone)]
pub enum ShardEvent {
    /// Fresh session established (Identify acknowledged with READY)
    Ready {
        shard: u32,
        session_id: String,
        /// The bot's own user object, as sent by the server
        user: Option<Value>,
    },
    /// Previous session reattached (Resume acknowledged with RESUMED)
    Resumed { shard: u32 },
    /// The connection dropped; the shard is reconnecting
    ConnectionLost { shard: u32 },
    /// Any other dispatch, forwarded opaquely
    Dispatch {
        shard: u32,
        event: String,
        seq: Option<u64>,
        data: Value,
    },
}

impl ShardEvent {
    /// Index of the shard this event came from
    pub fn shard(&self) -> u32 {
        match self {
            Self::Ready { shard, .. }
            | Self::Resumed { shard }
            | Self::ConnectionLost { shard }
            | Self::Dispatch { shard, .. } => *shard,
        }
    }
}
