use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use pulsar::compression::{
    Compression as PulsarCompression, CompressionLz4, CompressionSnappy, CompressionZlib,
    CompressionZstd,
};
use pulsar::error::{ConnectionError, ProducerError};
use pulsar::producer::{self, ProducerOptions, SendFuture};
use pulsar::routing_policy::{CustomRoutingPolicy, RoutingPolicy};
use pulsar::{SerializeMessage, TokioExecutor};
use tracing::{debug, info, warn};

use crate::{Error, PulsarClient, Result};

/// Compression codec applied by the producer to every (batched) payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Lz4,
    Zlib,
    Zstd,
    Snappy,
}

impl From<Compression> for Option<PulsarCompression> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Lz4 => Some(PulsarCompression::Lz4(CompressionLz4::default())),
            Compression::Zlib => Some(PulsarCompression::Zlib(CompressionZlib::default())),
            Compression::Zstd => Some(PulsarCompression::Zstd(CompressionZstd::default())),
            Compression::Snappy => Some(PulsarCompression::Snappy(CompressionSnappy::default())),
        }
    }
}

/// Batching settings. Batching is disabled when [ProducerConfig::batching] is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batching {
    /// Maximum number of messages in a batch
    pub max_messages: u32,
    /// Maximum time a message waits in a partially filled batch
    pub max_publish_delay: Duration,
}

/// Hash applied to the partition key of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyHashing {
    /// `String.hashCode()` of the JVM client, over the UTF-16 code units of the key.
    JavaString,
    #[default]
    Murmur3_32,
}

impl KeyHashing {
    fn partition(self, key: &str, partitions: usize) -> usize {
        match self {
            KeyHashing::Murmur3_32 => {
                RoutingPolicy::compute_partition_index_for_key(key, partitions)
            }
            KeyHashing::JavaString => {
                let hash = key
                    .encode_utf16()
                    .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)));
                (hash & i32::MAX) as usize % partitions
            }
        }
    }
}

/// How messages are spread over the partitions of a partitioned topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Keyed messages follow the murmur3 hash of their key, unkeyed ones round-robin.
    RoundRobin,
    /// Every message goes to the same partition.
    Single,
    /// Keyed messages follow the given hash of their key, unkeyed ones round-robin.
    KeyHash(KeyHashing),
}

impl From<Routing> for RoutingPolicy {
    fn from(value: Routing) -> Self {
        match value {
            Routing::RoundRobin => RoutingPolicy::RoundRobin,
            Routing::Single => RoutingPolicy::Single,
            Routing::KeyHash(hashing) => {
                RoutingPolicy::Custom(Arc::new(KeyHashRouter::new(hashing)))
            }
        }
    }
}

/// Routes by key hash and falls back to round-robin for unkeyed messages.
struct KeyHashRouter {
    hashing: KeyHashing,
    next: AtomicUsize,
}

impl KeyHashRouter {
    fn new(hashing: KeyHashing) -> Self {
        KeyHashRouter {
            hashing,
            next: AtomicUsize::new(0),
        }
    }
}

impl CustomRoutingPolicy for KeyHashRouter {
    fn route(&self, message: &producer::Message, num_producers: usize) -> usize {
        if num_producers == 0 {
            return 0;
        }
        match &message.partition_key {
            Some(key) => self.hashing.partition(key, num_producers),
            None => self.next.fetch_add(1, Ordering::Relaxed) % num_producers,
        }
    }
}

/// Configuration for creating a Pulsar producer
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// The topic to send messages to
    pub topic: String,
    /// The name of the producer. The broker uses it together with the sequence id
    /// to drop retransmitted messages.
    pub producer_name: Option<String>,
    pub batching: Option<Batching>,
    pub compression: Compression,
    /// When false, a send that finds the pending queue full fails instead of waiting.
    pub block_if_queue_full: bool,
    pub routing: Routing,
    /// Properties attached to the producer (not to the messages)
    pub properties: HashMap<String, String>,
}

/// The message to send to a Pulsar topic
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// User-defined properties of the message
    pub properties: HashMap<String, String>,
    /// Key used by the broker to pick the partition of a partitioned topic
    pub partition_key: Option<String>,
    /// Event time of the message. Epoch time in milliseconds
    pub event_time_epoch_ms: Option<u64>,
    /// Sequence id used for de-duplication of retransmissions
    /// It never reaches the broker, pulsar-rs assigns its own per producer sequence ids.
    pub sequence_id: Option<u64>,
    /// The message payload
    pub payload: Bytes,
}

impl SerializeMessage for Message {
    fn serialize_message(input: Self) -> std::result::Result<producer::Message, pulsar::Error> {
        Ok(producer::Message {
            payload: input.payload.to_vec(),
            properties: input.properties,
            partition_key: input.partition_key,
            event_time: input.event_time_epoch_ms,
            ..Default::default()
        })
    }
}

/// Where a message landed once the broker confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReceipt {
    /// The message was persisted.
    Persisted {
        ledger_id: u64,
        entry_id: u64,
        partition: i32,
    },
    /// The message carried a sequence id that was already sent on this producer and was dropped.
    Duplicate { sequence_id: u64 },
}

/// The broker confirmation of an enqueued message. The receipt may come long after the
/// message was handed to the producer.
pub enum PendingReceipt {
    Sent(SendFuture),
    Duplicate(u64),
}

impl PendingReceipt {
    pub async fn wait(self) -> Result<SendReceipt> {
        match self {
            PendingReceipt::Duplicate(sequence_id) => Ok(SendReceipt::Duplicate { sequence_id }),
            PendingReceipt::Sent(fut) => {
                let receipt = fut.await?;
                let Some(id) = receipt.message_id else {
                    return Err(Error::Other(format!(
                        "Broker receipt without message id. sequence_id={}",
                        receipt.sequence_id
                    )));
                };
                Ok(SendReceipt::Persisted {
                    ledger_id: id.ledger_id,
                    entry_id: id.entry_id,
                    partition: id.partition.unwrap_or(-1),
                })
            }
        }
    }
}

/// A producer bound to one topic (and optionally one deterministic name).
///
/// Retransmissions are only dropped while this instance lives: the highest sequence id sent is
/// kept here and starts empty on a re-created producer.
pub struct Producer {
    topic: String,
    name: Option<String>,
    /// `send_non_blocking` takes `&mut self`, the lock is only held while enqueuing.
    inner: tokio::sync::Mutex<pulsar::Producer<TokioExecutor>>,
    highest_sequence_id: parking_lot::Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl PulsarClient {
    pub async fn create_producer(&self, config: ProducerConfig) -> Result<Producer> {
        let options = ProducerOptions {
            batch_size: config.batching.as_ref().map(|b| b.max_messages),
            batch_timeout: config.batching.as_ref().map(|b| b.max_publish_delay),
            compression: config.compression.into(),
            block_queue_if_full: config.block_if_queue_full,
            routing_policy: Some(config.routing.into()),
            metadata: config
                .properties
                .into_iter()
                .collect::<BTreeMap<String, String>>(),
            ..Default::default()
        };

        let mut builder = self
            .pulsar
            .producer()
            .with_topic(&config.topic)
            .with_options(options);
        if let Some(name) = &config.producer_name {
            builder = builder.with_name(name);
        }
        let producer = builder.build().await.map_err(Error::Pulsar)?;
        producer.check_connection().await?;

        info!(
            topic = %config.topic,
            producer = ?config.producer_name,
            batching = ?config.batching,
            routing = ?config.routing,
            block_if_queue_full = config.block_if_queue_full,
            "Created Pulsar producer"
        );

        Ok(Producer {
            topic: config.topic,
            name: config.producer_name,
            inner: tokio::sync::Mutex::new(producer),
            highest_sequence_id: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

impl Producer {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.topic.clone())
    }

    /// Hands the message to the producer. The returned [PendingReceipt] resolves once the broker
    /// confirms (or rejects) the message.
    pub async fn send(&self, message: Message) -> Result<PendingReceipt> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ProducerClosed(self.label()));
        }

        if let Some(sequence_id) = message.sequence_id {
            let highest = *self.highest_sequence_id.lock();
            if highest.is_some_and(|h| sequence_id <= h) {
                debug!(producer = ?self.name, sequence_id, "Dropping retransmitted message");
                return Ok(PendingReceipt::Duplicate(sequence_id));
            }
        }

        let sequence_id = message.sequence_id;
        let mut producer = self.inner.lock().await;
        // the receipt may come long after the message was enqueued, hence the SendFuture.
        // a full queue waits here with block_queue_if_full and fails with SlowDown otherwise
        let fut = producer
            .send_non_blocking(message)
            .await
            .map_err(|e| match e {
                pulsar::Error::Producer(ProducerError::Connection(ConnectionError::SlowDown)) => {
                    Error::QueueFull(self.label())
                }
                e => Error::Pulsar(e),
            })?;
        drop(producer);

        if let Some(sequence_id) = sequence_id {
            let mut highest = self.highest_sequence_id.lock();
            if highest.is_none_or(|h| sequence_id > h) {
                *highest = Some(sequence_id);
            }
        }
        Ok(PendingReceipt::Sent(fut))
    }

    /// Closes the producer. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut producer = self.inner.lock().await;
        if let Err(e) = producer.close().await {
            warn!(
                topic = %self.topic,
                producer = ?self.name,
                ?e,
                "Failed to close Pulsar producer"
            );
            return Err(Error::Pulsar(e));
        }
        info!(topic = %self.topic, producer = ?self.name, "Closed Pulsar producer");
        Ok(())
    }
}

/// Expose methods so that sinkflow-core crate doesn't have to depend on pulsar.
#[cfg(feature = "pulsar-tests-utils")]
pub mod test_utils {
    use pulsar::consumer::InitialPosition;
    use pulsar::{ConsumerOptions, Pulsar, SubType, TokioExecutor};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    pub async fn setup_test_topic() -> (String, String) {
        let topic_name = format!(
            "persistent://public/default/sinkflow_{}",
            Uuid::new_v4().to_string().replace("-", "")
        );
        let subscription_name = format!(
            "sink_subscription_{}",
            Uuid::new_v4().to_string().replace("-", "")
        );

        (topic_name, subscription_name)
    }

    /// The message received from Pulsar.
    pub struct TestPulsarMessage {
        pub properties: HashMap<String, String>,
        pub payload: String,
        pub partition_key: Option<String>,
        pub event_time: Option<u64>,
    }

    pub async fn consume_messages_from_topic(
        topic: &str,
        subscription: &str,
        count: usize,
    ) -> Vec<TestPulsarMessage> {
        let pulsar = Pulsar::builder("pulsar://localhost:6650", TokioExecutor)
            .build()
            .await
            .expect("Failed to connect to Pulsar");

        let mut consumer = pulsar
            .consumer()
            .with_topic(topic)
            .with_subscription_type(SubType::Exclusive)
            .with_options(
                ConsumerOptions::default().with_initial_position(InitialPosition::Earliest),
            )
            .with_subscription(subscription)
            .build::<String>()
            .await
            .expect("Failed to create consumer");

        let mut messages = Vec::with_capacity(count);
        while messages.len() < count {
            let result = timeout(Duration::from_secs(5), consumer.next()).await;
            assert!(result.is_ok(), "Did not receive message from Pulsar");
            let msg = result
                .unwrap()
                .expect("No message received from Pulsar")
                .expect("Pulsar error");
            let payload = String::from_utf8_lossy(&msg.payload.data).to_string();
            let properties = msg
                .metadata()
                .properties
                .iter()
                .map(|kv| (kv.key.clone(), kv.value.clone()))
                .collect();

            messages.push(TestPulsarMessage {
                properties,
                payload,
                partition_key: msg.metadata().partition_key.clone(),
                event_time: msg.metadata().event_time,
            });
        }
        messages
    }
}
