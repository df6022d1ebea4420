//! Broker state, stored messages, and producer bookkeeping.

use std::collections::HashMap;

use bytes::Bytes;

/// A message as handed to a [super::SimpleProducer].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleMessage {
    /// Sequence id used for de-duplication. Only honoured for named producers.
    pub sequence_id: Option<u64>,
    pub partition_key: Option<String>,
    pub properties: HashMap<String, String>,
    pub event_time_ms: Option<u64>,
    pub payload: Bytes,
}

/// A message persisted on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Id of the producer that published the message.
    pub producer_id: u64,
    /// Position of the message on its topic.
    pub entry_id: u64,
    pub message: SimpleMessage,
}

/// Options a producer is created with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleProducerOptions {
    /// Deterministic producer name. Named producers get broker-side de-duplication.
    pub name: Option<String>,
    pub batching_enabled: bool,
    pub block_if_queue_full: bool,
    pub properties: HashMap<String, String>,
}

/// A record of every producer the broker has created.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerInfo {
    pub id: u64,
    pub topic: String,
    pub options: SimpleProducerOptions,
}

/// Outcome of a publish that the broker accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleReceipt {
    /// The message was appended to the topic.
    Persisted { entry_id: u64 },
    /// The message repeated an already persisted sequence id of the same named producer.
    Duplicate { sequence_id: u64 },
}

/// Shared broker state.
#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    pub(crate) topics: HashMap<String, Vec<StoredMessage>>,
    pub(crate) producers: Vec<ProducerInfo>,
    /// Number of close calls per producer id.
    pub(crate) closes: HashMap<u64, usize>,
    /// Highest persisted sequence id per (topic, producer name).
    highest_sequence: HashMap<(String, String), u64>,
    next_producer_id: u64,
}

impl BrokerState {
    pub(crate) fn register_producer(&mut self, topic: &str, options: SimpleProducerOptions) -> u64 {
        self.next_producer_id += 1;
        let id = self.next_producer_id;
        self.producers.push(ProducerInfo {
            id,
            topic: topic.to_string(),
            options,
        });
        id
    }

    /// Appends the message to the topic unless a named producer already persisted a message
    /// with the same or a higher sequence id.
    pub(crate) fn persist(
        &mut self,
        topic: &str,
        producer_id: u64,
        producer_name: Option<&str>,
        message: SimpleMessage,
    ) -> SimpleReceipt {
        if let (Some(name), Some(sequence_id)) = (producer_name, message.sequence_id) {
            let key = (topic.to_string(), name.to_string());
            match self.highest_sequence.get(&key) {
                Some(&highest) if sequence_id <= highest => {
                    return SimpleReceipt::Duplicate { sequence_id };
                }
                _ => {
                    self.highest_sequence.insert(key, sequence_id);
                }
            }
        }

        let messages = self.topics.entry(topic.to_string()).or_default();
        let entry_id = messages.len() as u64;
        messages.push(StoredMessage {
            producer_id,
            entry_id,
            message,
        });
        SimpleReceipt::Persisted { entry_id }
    }
}
