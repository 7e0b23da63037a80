use thiserror::Error;

/// Main error type for the REST queue
#[derive(Error, Debug)]
pub enum RestError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request kept hitting the bucket's rate limit
    #[error("Exceeded {attempts} retry attempts for rate-limited request")]
    RetriesExhausted { attempts: u32 },

    /// The request body cannot be replayed for a retry
    #[error("Request is not retryable (streaming body)")]
    UnclonableRequest,

    /// The bucket worker is gone (client shut down)
    #[error("Request queue closed")]
    QueueClosed,
}

/// Result type for REST operations
pub type Result<T> = std::result::Result<T, RestError>;
