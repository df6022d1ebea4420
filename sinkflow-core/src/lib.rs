//! Sink side publish/ack engine.
//!
//! A [Sink] takes [SinkRecord]s from the connector runtime and publishes them to topics through
//! a pool of producers, acknowledging every record according to the configured
//! [ProcessingGuarantee]:
//! - at-most-once acks a record as soon as its publish is issued
//! - at-least-once acks it once the broker confirms it and fails it otherwise
//! - effectively-once does the same through producers named after the source partition, with
//!   sequence ids, so retransmissions can be dropped

pub use self::error::{Error, Result};

mod error;

/// Sink configuration.
pub mod config;
pub use config::{ProcessingGuarantee, SinkConfig};

/// Records and their acknowledgement.
pub mod message;
pub use message::{AckHandle, ReadAck, SinkRecord};

/// Output schema validation.
pub mod schema;

/// Producer and transport abstraction.
pub mod transport;
pub use transport::pulsar::connect;
pub use sinkflow_pulsar::{ClientConfig, PulsarAuth, PulsarClient};

mod pool;
mod processor;

mod sink;
pub use sink::{Sink, SinkState};
