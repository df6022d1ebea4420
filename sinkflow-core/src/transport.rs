//! The narrow publish capability the sink needs from a messaging client.
//!
//! [Transport] creates producers, [Producer] enqueues messages and hands back a [ReceiptFuture]
//! that resolves once the broker confirms (or rejects) the message.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;

use crate::Result;
use crate::config::{BatchingConfig, CompressionType, HashingScheme, RoutingMode, SinkConfig};
use crate::message::{MessageId, OutboundMessage};

/// Pulsar client backed transport.
pub(crate) mod pulsar;

/// In-memory broker backed transport.
#[cfg(test)]
pub(crate) mod simple;

/// Broker confirmation of an enqueued message.
pub type ReceiptFuture = BoxFuture<'static, Result<MessageId>>;

#[trait_variant::make(Producer: Send)]
#[allow(dead_code)]
pub trait LocalProducer {
    /// Enqueues the message. Errors returned here mean the message never left the producer.
    async fn publish(&self, message: OutboundMessage) -> Result<ReceiptFuture>;

    async fn close(&self) -> Result<()>;
}

pub trait Transport: Send + Sync + 'static {
    type Producer: Producer + Sync + 'static;

    /// Creates a producer bound to `topic`. This talks to the broker and may take a while.
    fn create_producer(
        &self,
        topic: &str,
        options: &ProducerOptions,
    ) -> impl Future<Output = Result<Self::Producer>> + Send;
}

/// Options a producer is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerOptions {
    /// Deterministic producer name. Transports that de-duplicate do so per name and sequence id.
    pub producer_name: Option<String>,
    pub batching: Option<BatchingConfig>,
    /// When false, a full producer queue fails the publish instead of waiting.
    pub block_if_queue_full: bool,
    pub compression: CompressionType,
    pub hashing_scheme: HashingScheme,
    pub routing_mode: RoutingMode,
    pub properties: HashMap<String, String>,
}

impl ProducerOptions {
    pub(crate) fn from_config(config: &SinkConfig) -> Self {
        ProducerOptions {
            producer_name: None,
            batching: config.producer.batching.clone(),
            block_if_queue_full: config.producer.block_if_queue_full,
            compression: config.producer.compression,
            hashing_scheme: config.producer.hashing_scheme,
            routing_mode: config.producer.routing_mode,
            properties: config.producer_properties(),
        }
    }
}
