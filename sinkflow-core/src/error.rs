use thiserror::Error;

use crate::sink::SinkState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Connection Error - {0}")]
    Connection(String),

    /// An effectively-once record is missing its partition id or sequence id.
    #[error("Missing De-duplication Metadata - record has no {0}")]
    MissingDeduplicationMetadata(&'static str),

    #[error("No Destination Topic - record has no topic and the sink has no default topic")]
    NoDestinationTopic,

    #[error("Producer Creation Error - topic={topic}, {reason}")]
    ProducerCreation { topic: String, reason: String },

    #[error("Publish Error - {0}")]
    Publish(String),

    #[error("Invalid Sink State - cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SinkState,
    },

    #[error("Producer pool is closed")]
    Closed,
}

impl From<sinkflow_pulsar::Error> for Error {
    fn from(value: sinkflow_pulsar::Error) -> Self {
        Error::Publish(value.to_string())
    }
}
