//! Simple broker implementation for testing.
//!
//! This module provides an in-memory broker that mimics the producer side of Pulsar
//! but allows for testing of error paths, producer re-creation, de-duplication, etc.
//!
//! # Features
//! - Topics as append-only message logs
//! - Named producers get de-duplication by sequence id, like broker-side dedup
//! - Every created and closed producer is recorded for assertions
//! - Error injection for creation, enqueue, publish, and close
//! - A fillable pending queue that blocks or rejects sends per producer options
//!
//! # Example
//! ```ignore
//! use sinkflow_testing::simplepulsar::{SimplePulsar, SimpleProducerOptions};
//!
//! let broker = SimplePulsar::new();
//! let producer = broker.create_producer("topic", SimpleProducerOptions::default()).await?;
//! let receipt = producer.send(message).await?.wait().await?;
//! ```

/// Broker state and message types.
mod broker;
/// Error types.
mod error;
/// Error injector for testing.
mod error_injector;
/// Producer implementation.
mod producer;

// Re-exports
pub use broker::{
    ProducerInfo, SimpleMessage, SimpleProducerOptions, SimpleReceipt, StoredMessage,
};
pub use error::{Result, SimplePulsarError};
pub use error_injector::ErrorInjector;
pub use producer::{PendingSend, SimpleProducer};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use parking_lot::RwLock;

use broker::BrokerState;

/// Simple broker for testing.
///
/// Cheap to clone, all clones share the same topics and producer records.
#[derive(Debug, Clone, Default)]
pub struct SimplePulsar {
    /// Shared broker state.
    state: Arc<RwLock<BrokerState>>,
    /// Error injector for testing.
    error_injector: Arc<ErrorInjector>,
}

impl SimplePulsar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the error injector for this broker.
    ///
    /// Use this to inject errors for testing.
    pub fn error_injector(&self) -> &Arc<ErrorInjector> {
        &self.error_injector
    }

    /// Creates a producer for the topic.
    pub async fn create_producer(
        &self,
        topic: &str,
        options: SimpleProducerOptions,
    ) -> Result<SimpleProducer> {
        let latency = self.error_injector.create_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.error_injector.should_fail_create() {
            return Err(SimplePulsarError::ProducerCreation {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let name = options.name.clone();
        let block_if_queue_full = options.block_if_queue_full;
        let id = self.state.write().register_producer(topic, options);
        Ok(SimpleProducer {
            id,
            topic: topic.to_string(),
            name,
            block_if_queue_full,
            state: Arc::clone(&self.state),
            error_injector: Arc::clone(&self.error_injector),
            closed: AtomicBool::new(false),
        })
    }

    /// Every producer created so far, in creation order.
    pub fn created_producers(&self) -> Vec<ProducerInfo> {
        self.state.read().producers.clone()
    }

    /// Producers created for the given topic, in creation order.
    pub fn producers_for_topic(&self, topic: &str) -> Vec<ProducerInfo> {
        self.state
            .read()
            .producers
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of times close was called on the producer.
    pub fn close_count(&self, producer_id: u64) -> usize {
        self.state
            .read()
            .closes
            .get(&producer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Messages persisted on the topic.
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        self.state
            .read()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}
