use std::sync::Arc;

use tracing::{debug, error};

use crate::Result;
use crate::config::SinkConfig;
use crate::message::SinkRecord;
use crate::pool::ProducerPool;
use crate::processor::resolve_topic;
use crate::transport::{Producer, ProducerOptions, Transport};

/// Acks every record as soon as its publish is issued. A failed publish is logged and the
/// record is lost.
pub(crate) struct AtMostOnceProcessor<T: Transport> {
    config: Arc<SinkConfig>,
    pub(super) pool: Arc<ProducerPool<T>>,
    options: ProducerOptions,
}

impl<T: Transport> AtMostOnceProcessor<T> {
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

        match producer.producer.publish(message).await {
            Ok(receipt) => {
                ack_handle.ack();
                tokio::spawn(async move {
                    match receipt.await {
                        Ok(message_id) => debug!(%topic, %message_id, "Publish confirmed"),
                        Err(e) => error!(%topic, ?e, "Publish failed, message is dropped"),
                    }
                });
            }
            Err(e) => {
                error!(%topic, ?e, "Failed to enqueue message, message is dropped");
                ack_handle.ack();
            }
        }
        Ok(())
    }
}
