use std::sync::Arc;

use tracing::error;

use crate::Result;
use crate::config::SinkConfig;
use crate::message::SinkRecord;
use crate::pool::ProducerPool;
use crate::processor::{ack_on_receipt, resolve_topic};
use crate::transport::{Producer, ProducerOptions, Transport};

/// Acks a record once the broker confirms it and fails it otherwise, so the source redelivers.
/// Any failure evicts the producer of the topic.
pub(crate) struct AtLeastOnceProcessor<T: Transport> {
    config: Arc<SinkConfig>,
    pub(super) pool: Arc<ProducerPool<T>>,
    options: ProducerOptions,
}

impl<T: Transport> AtLeastOnceProcessor<T> {
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

    pub(crate) async fn write(&self, record: SinkRecord) -> Result<()> {
        let topic = resolve_topic(&record, &self.config)?;
        let (message, ack_handle) = record.into_outbound(false)?;
        let producer = self
            .pool
            .get_or_create(&topic, &topic, &self.options)
            .await?;

        let receipt = match producer.producer.publish(message).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(%topic, producer_id = producer.id, ?e, "Failed to enqueue message");
                self.pool.evict(&topic, producer.id).await;
                ack_handle.fail();
                return Err(e);
            }
        };

        ack_on_receipt(
            Arc::clone(&self.pool),
            topic,
            producer.id,
            receipt,
            ack_handle,
        );
        Ok(())
    }
}
