//! Records handed to the sink by the source, and the acknowledgement that travels back.
//!
//! Every [SinkRecord] carries an [AckHandle]. `ack` and `fail` consume the handle, so a record is
//! decided at most once. A handle dropped without a decision sends [ReadAck::Nak], so a record
//! that never reached a decision (e.g. an early error return) is redelivered.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::Error;
use crate::Result;

/// Outcome reported back to the source for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAck {
    /// The record was written and need not be delivered again.
    Ack,
    /// The record was not written and should be redelivered.
    Nak,
}

#[derive(Debug)]
pub struct AckHandle {
    ack_tx: Option<oneshot::Sender<ReadAck>>,
}

impl AckHandle {
    pub fn new(ack_tx: oneshot::Sender<ReadAck>) -> Self {
        Self {
            ack_tx: Some(ack_tx),
        }
    }

    /// Creates a handle together with the receiver the source waits on.
    pub fn channel() -> (Self, oneshot::Receiver<ReadAck>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn ack(mut self) {
        self.send(ReadAck::Ack);
    }

    pub fn fail(mut self) {
        self.send(ReadAck::Nak);
    }

    fn send(&mut self, ack: ReadAck) {
        if let Some(tx) = self.ack_tx.take() {
            // the source may have stopped listening, nothing left to tell it then
            let _ = tx.send(ack);
        }
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        self.send(ReadAck::Nak);
    }
}

/// A record to be written to a topic.
#[derive(Debug)]
pub struct SinkRecord {
    pub value: Bytes,
    /// Key of the record. Used as the partition key of the published message.
    pub key: Option<String>,
    /// Overrides the default topic of the sink.
    pub destination_topic: Option<String>,
    /// Source partition the record was read from. Required for effectively-once.
    pub partition_id: Option<String>,
    /// Monotonically increasing position of the record within its partition. Required for
    /// effectively-once.
    pub sequence_id: Option<u64>,
    pub properties: HashMap<String, String>,
    pub event_time: Option<DateTime<Utc>>,
    pub ack_handle: AckHandle,
}

impl SinkRecord {
    pub fn new(value: impl Into<Bytes>, ack_handle: AckHandle) -> Self {
        SinkRecord {
            value: value.into(),
            key: None,
            destination_topic: None,
            partition_id: None,
            sequence_id: None,
            properties: HashMap::new(),
            event_time: None,
            ack_handle,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_destination_topic(mut self, topic: impl Into<String>) -> Self {
        self.destination_topic = Some(topic.into());
        self
    }

    pub fn with_partition_id(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }

    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_event_time(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = Some(event_time);
        self
    }

    /// The record's own topic, if it carries a non-empty one.
    pub(crate) fn topic_override(&self) -> Option<&str> {
        self.destination_topic.as_deref().filter(|t| !t.is_empty())
    }

    /// Splits the record into the message to publish and the handle to decide it with.
    /// The sequence id is only forwarded when `include_sequence` is set.
    pub(crate) fn into_outbound(
        self,
        include_sequence: bool,
    ) -> Result<(OutboundMessage, AckHandle)> {
        let event_time_ms = match self.event_time {
            Some(event_time) => {
                let millis = event_time.timestamp_millis();
                let millis = u64::try_from(millis).map_err(|_| {
                    Error::Publish(format!("Event time before the unix epoch: {event_time}"))
                })?;
                Some(millis)
            }
            None => None,
        };

        let message = OutboundMessage {
            partition_key: self.key,
            properties: self.properties,
            event_time_ms,
            sequence_id: if include_sequence {
                self.sequence_id
            } else {
                None
            },
            payload: self.value,
        };
        Ok((message, self.ack_handle))
    }
}

/// A message ready to be handed to a producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub partition_key: Option<String>,
    pub properties: HashMap<String, String>,
    pub event_time_ms: Option<u64>,
    pub sequence_id: Option<u64>,
    pub payload: Bytes,
}

/// Where the broker stored a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageId {
    Persisted {
        ledger_id: u64,
        entry_id: u64,
        partition: i32,
    },
    /// The broker recognised the message as a retransmission and dropped it.
    Duplicate { sequence_id: u64 },
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Persisted {
                ledger_id,
                entry_id,
                partition,
            } => write!(f, "{ledger_id}:{entry_id}:{partition}"),
            MessageId::Duplicate { sequence_id } => write!(f, "duplicate({sequence_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[tokio::test]
    async fn test_ack_handle_ack() {
        let (handle, rx) = AckHandle::channel();
        handle.ack();
        assert_eq!(rx.await.unwrap(), ReadAck::Ack);
    }

    #[tokio::test]
    async fn test_ack_handle_fail() {
        let (handle, rx) = AckHandle::channel();
        handle.fail();
        assert_eq!(rx.await.unwrap(), ReadAck::Nak);
    }

    #[tokio::test]
    async fn test_dropped_ack_handle_naks() {
        let (handle, rx) = AckHandle::channel();
        drop(handle);
        assert_eq!(rx.await.unwrap(), ReadAck::Nak);
    }

    #[test]
    fn test_ack_after_receiver_dropped_does_not_panic() {
        let (handle, rx) = AckHandle::channel();
        drop(rx);
        handle.ack();
    }

    #[test]
    fn test_into_outbound() {
        let (handle, _rx) = AckHandle::channel();
        let event_time = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let record = SinkRecord::new("value", handle)
            .with_key("user-1")
            .with_partition_id("p1")
            .with_sequence_id(9)
            .with_properties(HashMap::from([("k".to_string(), "v".to_string())]))
            .with_event_time(event_time);

        let (message, _handle) = record.into_outbound(true).unwrap();
        assert_eq!(
            message,
            OutboundMessage {
                partition_key: Some("user-1".to_string()),
                properties: HashMap::from([("k".to_string(), "v".to_string())]),
                event_time_ms: Some(1_700_000_000_000),
                sequence_id: Some(9),
                payload: Bytes::from("value"),
            }
        );
    }

    #[test]
    fn test_into_outbound_without_sequence() {
        let (handle, _rx) = AckHandle::channel();
        let record = SinkRecord::new("value", handle).with_sequence_id(9);
        let (message, _handle) = record.into_outbound(false).unwrap();
        assert_eq!(message.sequence_id, None);
    }

    #[tokio::test]
    async fn test_into_outbound_rejects_negative_event_time() {
        let (handle, rx) = AckHandle::channel();
        let record = SinkRecord::new("value", handle)
            .with_event_time(Utc.timestamp_millis_opt(-1).unwrap());
        assert!(matches!(record.into_outbound(false), Err(Error::Publish(_))));
        // the record was dropped along with the error
        assert_eq!(rx.await.unwrap(), ReadAck::Nak);
    }

    #[test]
    fn test_topic_override() {
        let (handle, _rx) = AckHandle::channel();
        let record = SinkRecord::new("v", handle).with_destination_topic("");
        assert_eq!(record.topic_override(), None);

        let (handle, _rx) = AckHandle::channel();
        let record = SinkRecord::new("v", handle).with_destination_topic("topic-1");
        assert_eq!(record.topic_override(), Some("topic-1"));
    }

    #[test]
    fn test_message_id_display() {
        let id = MessageId::Persisted {
            ledger_id: 1,
            entry_id: 2,
            partition: -1,
        };
        assert_eq!(id.to_string(), "1:2:-1");
        assert_eq!(
            MessageId::Duplicate { sequence_id: 4 }.to_string(),
            "duplicate(4)"
        );
    }
}
