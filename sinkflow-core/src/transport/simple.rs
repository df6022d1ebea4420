use sinkflow_testing::simplepulsar::{
    SimpleMessage, SimpleProducer, SimpleProducerOptions, SimplePulsar, SimpleReceipt,
};

use crate::error::{Error, Result};
use crate::message::{MessageId, OutboundMessage};
use crate::transport::{Producer, ProducerOptions, ReceiptFuture, Transport};

impl From<OutboundMessage> for SimpleMessage {
    fn from(msg: OutboundMessage) -> Self {
        SimpleMessage {
            sequence_id: msg.sequence_id,
            partition_key: msg.partition_key,
            properties: msg.properties,
            event_time_ms: msg.event_time_ms,
            payload: msg.payload,
        }
    }
}

fn message_id(receipt: SimpleReceipt) -> MessageId {
    match receipt {
        SimpleReceipt::Persisted { entry_id } => MessageId::Persisted {
            ledger_id: 0,
            entry_id,
            partition: -1,
        },
        SimpleReceipt::Duplicate { sequence_id } => MessageId::Duplicate { sequence_id },
    }
}

impl Transport for SimplePulsar {
    type Producer = SimpleProducer;

    async fn create_producer(
        &self,
        topic: &str,
        options: &ProducerOptions,
    ) -> Result<SimpleProducer> {
        let options = SimpleProducerOptions {
            name: options.producer_name.clone(),
            batching_enabled: options.batching.is_some(),
            block_if_queue_full: options.block_if_queue_full,
            properties: options.properties.clone(),
        };
        SimplePulsar::create_producer(self, topic, options)
            .await
            .map_err(|e| Error::ProducerCreation {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Producer for SimpleProducer {
    async fn publish(&self, message: OutboundMessage) -> Result<ReceiptFuture> {
        let pending = self
            .send(message.into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;
        Ok(Box::pin(async move {
            pending
                .wait()
                .await
                .map(message_id)
                .map_err(|e| Error::Publish(e.to_string()))
        }))
    }

    async fn close(&self) -> Result<()> {
        SimpleProducer::close(self)
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }
}
