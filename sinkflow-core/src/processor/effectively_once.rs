use std::sync::Arc;

use tracing::error;

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::message::SinkRecord;
use crate::pool::ProducerPool;
use crate::processor::{ack_on_receipt, resolve_topic};
use crate::transport::{Producer, ProducerOptions, Transport};

/// At-least-once with de-duplication. Every source partition publishes through its own producer
/// named after the partition, and every message carries the record's sequence id, so a transport
/// that de-duplicates per producer name drops retransmissions of already persisted records.
pub(crate) struct EffectivelyOnceProcessor<T: Transport> {
    config: Arc<SinkConfig>,
    pub(super) pool: Arc<ProducerPool<T>>,
    options: ProducerOptions,
}

impl<T: Transport> EffectivelyOnceProcessor<T> {
    pub(crate) fn new(
        config: Arc<SinkConfig>,
        pool: Arc<ProducerPool<T>>,
        options: ProducerOptions,
    ) -> Self {
        Self {
            config,
            pool,
            options,
        }
    }

    /// Producer options for the partition. Batching and blocking on a full queue are off, a
    /// stalled producer has to surface as a failed publish.
    fn partition_options(&self, partition_id: &str) -> ProducerOptions {
        ProducerOptions {
            producer_name: Some(partition_id.to_string()),
            batching: None,
            block_if_queue_full: false,
            ..self.options.clone()
        }
    }

    pub(crate) async fn write(&self, record: SinkRecord) -> Result<()> {
        let Some(partition_id) = record.partition_id.clone() else {
            return Err(Error::MissingDeduplicationMetadata("partition id"));
        };
        if record.sequence_id.is_none() {
            return Err(Error::MissingDeduplicationMetadata("sequence id"));
        }

        let topic = resolve_topic(&record, &self.config)?;
        let key = cache_key(&topic, &partition_id);
        let (message, ack_handle) = record.into_outbound(true)?;
        let producer = self
            .pool
            .get_or_create(&key, &topic, &self.partition_options(&partition_id))
            .await?;

        let receipt = match producer.producer.publish(message).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(%key, producer_id = producer.id, ?e, "Failed to enqueue message");
                self.pool.evict(&key, producer.id).await;
                ack_handle.fail();
                return Err(e);
            }
        };

        ack_on_receipt(Arc::clone(&self.pool), key, producer.id, receipt, ack_handle);
        Ok(())
    }
}

fn cache_key(topic: &str, partition_id: &str) -> String {
    format!("{topic}-{partition_id}")
}
