use thiserror::Error;

/// Main error type for the gateway crate
#[derive(Error, Debug)]
pub enum GatewayError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The peer closed the connection
    #[error("Connection closed: code {code}, reason: {reason}")]
    Closed { code: u16, reason: String },

    /// Frame (de)serialization error
    #[error("Frame error: {0}")]
    Frame(#[from] serde_json::Error),

    /// The server never acknowledged a heartbeat
    #[error("Missed heartbeat ack on shard {shard}")]
    MissedHeartbeat { shard: u32 },

    /// Invalid identify-gate concurrency value
    #[error("Invalid max concurrency: {0} (must be >= 1)")]
    InvalidConcurrency(u32),

    /// Use after dispose
    #[error("Identify gate has been disposed")]
    GateDisposed,

    /// Continuous-stream decompression failed
    #[error("Decompression error: {0}")]
    Decompress(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
