//! Error types for the simple broker.

use thiserror::Error;

/// Result type for simple broker operations.
pub type Result<T> = std::result::Result<T, SimplePulsarError>;

/// Errors specific to the simple broker implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimplePulsarError {
    #[error("Failed to create producer on topic {topic}: {reason}")]
    ProducerCreation { topic: String, reason: String },

    #[error("Failed to enqueue message: {0}")]
    Send(String),

    #[error("Broker rejected message: {0}")]
    Publish(String),

    #[error("Queue of producer {0} is full")]
    QueueFull(u64),

    #[error("Producer {0} is closed")]
    ProducerClosed(u64),

    #[error("Failed to close producer {0}")]
    Close(u64),
}
