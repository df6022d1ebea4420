//! Producer implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::broker::{BrokerState, SimpleMessage, SimpleReceipt};
use super::error::{Result, SimplePulsarError};
use super::error_injector::ErrorInjector;

/// Producer bound to one topic of a [super::SimplePulsar] broker.
#[derive(Debug)]
pub struct SimpleProducer {
    pub(crate) id: u64,
    pub(crate) topic: String,
    pub(crate) name: Option<String>,
    pub(crate) block_if_queue_full: bool,
    pub(crate) state: Arc<RwLock<BrokerState>>,
    pub(crate) error_injector: Arc<ErrorInjector>,
    pub(crate) closed: AtomicBool,
}

/// A message that was enqueued and waits for the broker answer.
#[must_use = "the broker only answers when the pending send is awaited"]
#[derive(Debug)]
pub struct PendingSend {
    topic: String,
    producer_id: u64,
    producer_name: Option<String>,
    message: SimpleMessage,
    reject: bool,
    latency: Duration,
    state: Arc<RwLock<BrokerState>>,
}

impl PendingSend {
    /// Waits for the broker answer.
    pub async fn wait(self) -> Result<SimpleReceipt> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.reject {
            return Err(SimplePulsarError::Publish(format!(
                "injected failure on topic {}",
                self.topic
            )));
        }
        Ok(self.state.write().persist(
            &self.topic,
            self.producer_id,
            self.producer_name.as_deref(),
            self.message,
        ))
    }
}

impl SimpleProducer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueues the message. Whether the broker accepts it is decided when the returned
    /// [PendingSend] is awaited. A full queue makes the send wait when the producer blocks on
    /// a full queue and fails it right away otherwise.
    pub async fn send(&self, message: SimpleMessage) -> Result<PendingSend> {
        if self.is_closed() {
            return Err(SimplePulsarError::ProducerClosed(self.id));
        }
        if self.error_injector.is_queue_full() {
            if !self.block_if_queue_full {
                return Err(SimplePulsarError::QueueFull(self.id));
            }
            self.error_injector.wait_for_queue().await;
            if self.is_closed() {
                return Err(SimplePulsarError::ProducerClosed(self.id));
            }
        }
        if self.error_injector.should_fail_send() {
            return Err(SimplePulsarError::Send(format!(
                "injected failure on producer {}",
                self.id
            )));
        }
        Ok(PendingSend {
            topic: self.topic.clone(),
            producer_id: self.id,
            producer_name: self.name.clone(),
            message,
            reject: self.error_injector.should_fail_publish(),
            latency: self.error_injector.publish_latency(),
            state: Arc::clone(&self.state),
        })
    }

    /// Closes the producer. Every call is counted by the broker, so tests can assert
    /// against double closes.
    pub async fn close(&self) -> Result<()> {
        *self.state.write().closes.entry(self.id).or_insert(0) += 1;
        self.closed.store(true, Ordering::Release);
        if self.error_injector.should_fail_close() {
            return Err(SimplePulsarError::Close(self.id));
        }
        Ok(())
    }
}
