use sinkflow_pulsar::producer::{
    Batching, Compression, KeyHashing, Message as PulsarMessage, ProducerConfig, Routing,
    SendReceipt,
};
use sinkflow_pulsar::{ClientConfig, PulsarClient};

use crate::config::{CompressionType, HashingScheme, RoutingMode};
use crate::error::{Error, Result};
use crate::message::{MessageId, OutboundMessage};
use crate::transport::{Producer, ProducerOptions, ReceiptFuture, Transport};

/// Connects to the Pulsar cluster.
pub async fn connect(config: ClientConfig) -> Result<PulsarClient> {
    sinkflow_pulsar::new_client(config)
        .await
        .map_err(|e| Error::Connection(e.to_string()))
}

impl From<CompressionType> for Compression {
    fn from(value: CompressionType) -> Self {
        match value {
            CompressionType::None => Compression::None,
            CompressionType::Lz4 => Compression::Lz4,
            CompressionType::Zlib => Compression::Zlib,
            CompressionType::Zstd => Compression::Zstd,
            CompressionType::Snappy => Compression::Snappy,
        }
    }
}

impl From<HashingScheme> for KeyHashing {
    fn from(value: HashingScheme) -> Self {
        match value {
            HashingScheme::JavaStringHash => KeyHashing::JavaString,
            HashingScheme::Murmur3_32Hash => KeyHashing::Murmur3_32,
        }
    }
}

/// The client's own round-robin hashes keys with murmur3, any other scheme needs the key router.
fn routing(mode: RoutingMode, hashing: HashingScheme) -> Routing {
    match (mode, hashing) {
        (RoutingMode::SinglePartition, _) => Routing::Single,
        (RoutingMode::RoundRobinPartition, HashingScheme::Murmur3_32Hash) => Routing::RoundRobin,
        (RoutingMode::RoundRobinPartition | RoutingMode::CustomPartition, hashing) => {
            Routing::KeyHash(hashing.into())
        }
    }
}

impl From<OutboundMessage> for PulsarMessage {
    fn from(msg: OutboundMessage) -> Self {
        PulsarMessage {
            properties: msg.properties,
            partition_key: msg.partition_key,
            event_time_epoch_ms: msg.event_time_ms,
            sequence_id: msg.sequence_id,
            payload: msg.payload,
        }
    }
}

impl From<SendReceipt> for MessageId {
    fn from(receipt: SendReceipt) -> Self {
        match receipt {
            SendReceipt::Persisted {
                ledger_id,
                entry_id,
                partition,
            } => MessageId::Persisted {
                ledger_id,
                entry_id,
                partition,
            },
            SendReceipt::Duplicate { sequence_id } => MessageId::Duplicate { sequence_id },
        }
    }
}

fn producer_config(topic: &str, options: &ProducerOptions) -> ProducerConfig {
    ProducerConfig {
        topic: topic.to_string(),
        producer_name: options.producer_name.clone(),
        batching: options.batching.as_ref().map(|b| Batching {
            max_messages: b.max_messages,
            max_publish_delay: b.max_publish_delay,
        }),
        compression: options.compression.into(),
        block_if_queue_full: options.block_if_queue_full,
        routing: routing(options.routing_mode, options.hashing_scheme),
        properties: options.properties.clone(),
    }
}

impl Transport for PulsarClient {
    type Producer = sinkflow_pulsar::producer::Producer;

    async fn create_producer(
        &self,
        topic: &str,
        options: &ProducerOptions,
    ) -> Result<sinkflow_pulsar::producer::Producer> {
        PulsarClient::create_producer(self, producer_config(topic, options))
            .await
            .map_err(|e| Error::ProducerCreation {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Producer for sinkflow_pulsar::producer::Producer {
    async fn publish(&self, message: OutboundMessage) -> Result<ReceiptFuture> {
        let pending = self.send(message.into()).await?;
        Ok(Box::pin(async move {
            pending
                .wait()
                .await
                .map(MessageId::from)
                .map_err(Error::from)
        }))
    }

    async fn close(&self) -> Result<()> {
        sinkflow_pulsar::producer::Producer::close(self)
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::config::BatchingConfig;

    #[test]
    fn test_producer_config_mapping() {
        let options = ProducerOptions {
            producer_name: Some("p1".to_string()),
            batching: Some(BatchingConfig {
                max_publish_delay: Duration::from_millis(10),
                max_messages: 100,
            }),
            block_if_queue_full: false,
            compression: CompressionType::Zstd,
            hashing_scheme: HashingScheme::Murmur3_32Hash,
            routing_mode: RoutingMode::CustomPartition,
            properties: HashMap::from([("application".to_string(), "sinkflow".to_string())]),
        };

        let config = producer_config("out", &options);
        assert_eq!(config.topic, "out");
        assert_eq!(config.producer_name.as_deref(), Some("p1"));
        assert_eq!(
            config.batching,
            Some(Batching {
                max_messages: 100,
                max_publish_delay: Duration::from_millis(10),
            })
        );
        assert_eq!(config.compression, Compression::Zstd);
        assert!(!config.block_if_queue_full);
        assert_eq!(config.routing, Routing::KeyHash(KeyHashing::Murmur3_32));
        assert_eq!(
            config.properties.get("application"),
            Some(&"sinkflow".to_string())
        );
    }

    #[test]
    fn test_routing_mapping() {
        let cases = [
            (
                RoutingMode::SinglePartition,
                HashingScheme::JavaStringHash,
                Routing::Single,
            ),
            (
                RoutingMode::RoundRobinPartition,
                HashingScheme::Murmur3_32Hash,
                Routing::RoundRobin,
            ),
            (
                RoutingMode::RoundRobinPartition,
                HashingScheme::JavaStringHash,
                Routing::KeyHash(KeyHashing::JavaString),
            ),
            (
                RoutingMode::CustomPartition,
                HashingScheme::JavaStringHash,
                Routing::KeyHash(KeyHashing::JavaString),
            ),
            (
                RoutingMode::CustomPartition,
                HashingScheme::Murmur3_32Hash,
                Routing::KeyHash(KeyHashing::Murmur3_32),
            ),
        ];
        for (mode, hashing, expected) in cases {
            assert_eq!(routing(mode, hashing), expected, "{mode} {hashing:?}");
        }
    }

    #[test]
    fn test_default_options_reach_the_client() {
        let config = producer_config(
            "out",
            &ProducerOptions::from_config(&crate::config::SinkConfig::default()),
        );
        assert!(config.block_if_queue_full);
        assert_eq!(
            config.batching,
            Some(Batching {
                max_messages: 1000,
                max_publish_delay: Duration::from_millis(10),
            })
        );
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.routing, Routing::KeyHash(KeyHashing::Murmur3_32));
    }

    #[test]
    fn test_outbound_message_mapping() {
        let msg = OutboundMessage {
            partition_key: Some("k".to_string()),
            properties: HashMap::new(),
            event_time_ms: Some(10),
            sequence_id: Some(3),
            payload: Bytes::from("v"),
        };
        let pulsar_msg = PulsarMessage::from(msg);
        assert_eq!(pulsar_msg.partition_key.as_deref(), Some("k"));
        assert_eq!(pulsar_msg.event_time_epoch_ms, Some(10));
        assert_eq!(pulsar_msg.sequence_id, Some(3));
        assert_eq!(pulsar_msg.payload, Bytes::from("v"));
    }

    #[test]
    fn test_receipt_mapping() {
        assert_eq!(
            MessageId::from(SendReceipt::Persisted {
                ledger_id: 1,
                entry_id: 2,
                partition: 0
            }),
            MessageId::Persisted {
                ledger_id: 1,
                entry_id: 2,
                partition: 0
            }
        );
        assert_eq!(
            MessageId::from(SendReceipt::Duplicate { sequence_id: 5 }),
            MessageId::Duplicate { sequence_id: 5 }
        );
    }

    #[cfg(feature = "pulsar-tests")]
    #[tokio::test]
    async fn test_pulsar_transport_publish() {
        use sinkflow_pulsar::producer::test_utils;

        use crate::config::SinkConfig;

        let (topic, subscription) = test_utils::setup_test_topic().await;
        let client = connect(ClientConfig {
            addr: "pulsar://localhost:6650".to_string(),
            auth: None,
        })
        .await
        .unwrap();

        let options = ProducerOptions::from_config(&SinkConfig::default());
        let producer = Transport::create_producer(&client, &topic, &options)
            .await
            .unwrap();
        let receipt = producer
            .publish(OutboundMessage {
                payload: Bytes::from("hello"),
                ..Default::default()
            })
            .await
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(receipt, MessageId::Persisted { .. }));

        let messages = test_utils::consume_messages_from_topic(&topic, &subscription, 1).await;
        assert_eq!(messages[0].payload, "hello");
        assert_eq!(
            messages[0].properties.get("application"),
            Some(&"sinkflow".to_string())
        );
        Producer::close(&producer).await.unwrap();
    }
}
