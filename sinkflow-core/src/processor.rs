//! Guarantee processors. One of them is chosen when the sink opens and decides how records are
//! routed to producers and when they are acked or failed.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::{ProcessingGuarantee, SinkConfig};
use crate::error::{Error, Result};
use crate::message::{AckHandle, SinkRecord};
use crate::pool::ProducerPool;
use crate::transport::{ProducerOptions, ReceiptFuture, Transport};

mod at_least_once;
mod at_most_once;
mod effectively_once;

pub(crate) use at_least_once::AtLeastOnceProcessor;
pub(crate) use at_most_once::AtMostOnceProcessor;
pub(crate) use effectively_once::EffectivelyOnceProcessor;

pub(crate) enum GuaranteeProcessor<T: Transport> {
    AtMostOnce(AtMostOnceProcessor<T>),
    AtLeastOnce(AtLeastOnceProcessor<T>),
    EffectivelyOnce(EffectivelyOnceProcessor<T>),
}

impl<T: Transport> GuaranteeProcessor<T> {
    pub(crate) fn new(config: Arc<SinkConfig>, transport: T) -> Self {
        let pool = Arc::new(ProducerPool::new(transport));
        let options = ProducerOptions::from_config(&config);
        info!(
            guarantee = %config.processing_guarantee,
            topic = ?config.topic,
            "Starting guarantee processor"
        );
        match config.processing_guarantee {
            ProcessingGuarantee::AtMostOnce => {
                GuaranteeProcessor::AtMostOnce(AtMostOnceProcessor::new(config, pool, options))
            }
            ProcessingGuarantee::AtLeastOnce => {
                GuaranteeProcessor::AtLeastOnce(AtLeastOnceProcessor::new(config, pool, options))
            }
            ProcessingGuarantee::EffectivelyOnce => GuaranteeProcessor::EffectivelyOnce(
                EffectivelyOnceProcessor::new(config, pool, options),
            ),
        }
    }

    /// Publishes the record. Errors returned here already failed the record.
    pub(crate) async fn write(&self, record: SinkRecord) -> Result<()> {
        match self {
            GuaranteeProcessor::AtMostOnce(p) => p.write(record).await,
            GuaranteeProcessor::AtLeastOnce(p) => p.write(record).await,
            GuaranteeProcessor::EffectivelyOnce(p) => p.write(record).await,
        }
    }

    /// Closes every producer. In-flight publishes are not waited for.
    pub(crate) async fn close(&self) {
        self.pool().close_all().await;
    }

    pub(crate) fn pool(&self) -> &Arc<ProducerPool<T>> {
        match self {
            GuaranteeProcessor::AtMostOnce(p) => &p.pool,
            GuaranteeProcessor::AtLeastOnce(p) => &p.pool,
            GuaranteeProcessor::EffectivelyOnce(p) => &p.pool,
        }
    }
}

/// The record's own topic, or else the default topic of the sink.
pub(crate) fn resolve_topic(record: &SinkRecord, config: &SinkConfig) -> Result<String> {
    record
        .topic_override()
        .or(config.topic.as_deref())
        .map(str::to_string)
        .ok_or(Error::NoDestinationTopic)
}

/// Acks the record once the broker confirms it. A rejected publish evicts the producer and then
/// fails the record, so the redelivered record starts from a fresh producer.
pub(crate) fn ack_on_receipt<T: Transport>(
    pool: Arc<ProducerPool<T>>,
    key: String,
    producer_id: u64,
    receipt: ReceiptFuture,
    ack_handle: AckHandle,
) {
    tokio::spawn(async move {
        match receipt.await {
            Ok(message_id) => {
                debug!(%key, %message_id, "Publish confirmed");
                ack_handle.ack();
            }
            Err(e) => {
                error!(%key, producer_id, ?e, "Publish failed");
                pool.evict(&key, producer_id).await;
                ack_handle.fail();
            }
        }
    });
}


#[cfg(test)]
mod tests {
    use sinkflow_testing::simplepulsar::SimplePulsar;

    use super::test_utils::record;
    use super::*;

    #[test]
    fn test_resolve_topic() {
        let config = SinkConfig {
            topic: Some("default".to_string()),
            ..Default::default()
        };

        let (r, _rx) = record("v");
        let r = r.with_destination_topic("topic-1");
        assert_eq!(resolve_topic(&r, &config).unwrap(), "topic-1");

        let (r, _rx) = record("v");
        assert_eq!(resolve_topic(&r, &config).unwrap(), "default");

        let (r, _rx) = record("v");
        let r = r.with_destination_topic("");
        assert_eq!(resolve_topic(&r, &config).unwrap(), "default");
    }

    #[test]
    fn test_resolve_topic_without_any_topic() {
        let (r, _rx) = record("v");
        assert!(matches!(
            resolve_topic(&r, &SinkConfig::default()),
            Err(Error::NoDestinationTopic)
        ));
    }

    #[tokio::test]
    async fn test_processor_follows_guarantee() {
        for (guarantee, expected) in [
            (ProcessingGuarantee::AtMostOnce, "at-most-once"),
            (ProcessingGuarantee::AtLeastOnce, "at-least-once"),
            (ProcessingGuarantee::EffectivelyOnce, "effectively-once"),
        ] {
            let config = Arc::new(SinkConfig {
                processing_guarantee: guarantee,
                ..Default::default()
            });
            let variant = match GuaranteeProcessor::new(config, SimplePulsar::new()) {
                GuaranteeProcessor::AtMostOnce(_) => "at-most-once",
                GuaranteeProcessor::AtLeastOnce(_) => "at-least-once",
                GuaranteeProcessor::EffectivelyOnce(_) => "effectively-once",
            };
            assert_eq!(variant, expected);
        }
    }

    #[tokio::test]
    async fn test_close_closes_every_producer() {
        let broker = SimplePulsar::new();
        let config = Arc::new(SinkConfig {
            topic: Some("default".to_string()),
            ..Default::default()
        });
        let processor = GuaranteeProcessor::new(config, broker.clone());

        let (r, _rx) = record("a");
        processor.write(r).await.unwrap();
        let (r, _rx) = record("b");
        processor.write(r.with_destination_topic("other")).await.unwrap();

        processor.close().await;
        for producer in broker.created_producers() {
            assert_eq!(broker.close_count(producer.id), 1);
        }
        assert_eq!(broker.created_producers().len(), 2);

        let (r, rx) = record("c");
        assert!(matches!(processor.write(r).await, Err(Error::Closed)));
        assert_eq!(
            test_utils::ack_of(rx).await,
            crate::message::ReadAck::Nak
        );
    }
}
