//! Producers keyed by cache key, created on first use and reused until evicted.
//!
//! Every key owns a slot with its own async lock. Creation, eviction and removal of a key
//! serialize through that lock, so two writers racing on a never-seen key create one producer
//! and an eviction can never interleave with a re-creation of the same key. Writers of different
//! keys never wait on each other. The map lock is only held to look up or detach a slot, never
//! across an await.
//!
//! A slot leaves the map before (or while) it is marked [SlotState::Retired]. A writer holding a
//! retired slot looks the key up again and finds a fresh slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::transport::{Producer, ProducerOptions, Transport};

/// A producer owned by the pool.
#[derive(Debug)]
pub(crate) struct PooledProducer<P> {
    /// Unique for the lifetime of the pool. Evictions are conditional on it.
    pub(crate) id: u64,
    pub(crate) topic: String,
    pub(crate) name: Option<String>,
    pub(crate) producer: P,
}

enum SlotState<P> {
    /// No producer yet, the next writer creates one.
    Vacant,
    Ready(Arc<PooledProducer<P>>),
    /// The slot was detached from the map and will never hold a producer again.
    Retired,
}

struct ProducerSlot<P> {
    state: tokio::sync::Mutex<SlotState<P>>,
}

impl<P> ProducerSlot<P> {
    fn new() -> Self {
        ProducerSlot {
            state: tokio::sync::Mutex::new(SlotState::Vacant),
        }
    }
}

pub(crate) struct ProducerPool<T: Transport> {
    transport: T,
    slots: parking_lot::Mutex<HashMap<String, Arc<ProducerSlot<T::Producer>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<T: Transport> ProducerPool<T> {
    pub(crate) fn new(transport: T) -> Self {
        ProducerPool {
            transport,
            slots: parking_lot::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the producer cached under `key`, creating it for `topic` if there is none.
    /// A failed creation leaves nothing behind, the next call for the key tries again.
    pub(crate) async fn get_or_create(
        &self,
        key: &str,
        topic: &str,
        options: &ProducerOptions,
    ) -> Result<Arc<PooledProducer<T::Producer>>> {
        loop {
            let slot = {
                let mut slots = self.slots.lock();
                if self.closed.load(Ordering::Acquire) {
                    return Err(Error::Closed);
                }
                Arc::clone(
                    slots
                        .entry(key.to_string())
                        .or_insert_with(|| Arc::new(ProducerSlot::new())),
                )
            };

            let mut state = slot.state.lock().await;
            match &*state {
                SlotState::Ready(producer) => return Ok(Arc::clone(producer)),
                SlotState::Retired => continue,
                SlotState::Vacant => {}
            }

            match self.transport.create_producer(topic, options).await {
                Ok(producer) => {
                    let pooled = Arc::new(PooledProducer {
                        id: self.next_id.fetch_add(1, Ordering::Relaxed),
                        topic: topic.to_string(),
                        name: options.producer_name.clone(),
                        producer,
                    });
                    info!(
                        key,
                        topic,
                        producer_name = ?pooled.name,
                        producer_id = pooled.id,
                        "Created producer"
                    );
                    *state = SlotState::Ready(Arc::clone(&pooled));
                    return Ok(pooled);
                }
                Err(e) => {
                    self.detach(key, &slot);
                    *state = SlotState::Retired;
                    return Err(e);
                }
            }
        }
    }

    /// Evicts the producer cached under `key` if it is still the one with `producer_id`.
    /// Returns whether anything was evicted.
    pub(crate) async fn evict(&self, key: &str, producer_id: u64) -> bool {
        let Some(slot) = self.slots.lock().get(key).cloned() else {
            return false;
        };

        let mut state = slot.state.lock().await;
        let producer = match std::mem::replace(&mut *state, SlotState::Retired) {
            SlotState::Ready(producer) if producer.id == producer_id => producer,
            other => {
                *state = other;
                return false;
            }
        };
        self.detach(key, &slot);
        drop(state);

        warn!(key, producer_id, "Evicting producer");
        Self::close_producer(&producer).await;
        true
    }

    /// Removes and closes the producer cached under `key`. No-op if there is none.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) async fn remove_producer(&self, key: &str) {
        let Some(slot) = self.slots.lock().remove(key) else {
            return;
        };

        let previous = std::mem::replace(&mut *slot.state.lock().await, SlotState::Retired);
        if let SlotState::Ready(producer) = previous {
            Self::close_producer(&producer).await;
        }
    }

    /// Closes every producer and refuses to create new ones. A producer failing to close does
    /// not stop the others from closing.
    pub(crate) async fn close_all(&self) {
        let slots: Vec<(String, Arc<ProducerSlot<T::Producer>>)> = {
            let mut slots = self.slots.lock();
            self.closed.store(true, Ordering::Release);
            slots.drain().collect()
        };

        for (key, slot) in slots {
            let previous = std::mem::replace(&mut *slot.state.lock().await, SlotState::Retired);
            if let SlotState::Ready(producer) = previous {
                info!(key, producer_id = producer.id, "Closing producer");
                Self::close_producer(&producer).await;
            }
        }
    }

    /// Drops the map entry for `key` if it still points at `slot`.
    fn detach(&self, key: &str, slot: &Arc<ProducerSlot<T::Producer>>) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(key);
        }
    }

    async fn close_producer(producer: &PooledProducer<T::Producer>) {
        if let Err(e) = producer.producer.close().await {
            warn!(
                topic = %producer.topic,
                producer_id = producer.id,
                ?e,
                "Failed to close producer, ignoring"
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn cache_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The producer currently cached under `key`, without creating one.
    #[cfg(test)]
    pub(crate) async fn get(&self, key: &str) -> Option<Arc<PooledProducer<T::Producer>>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let state = slot.state.lock().await;
        match &*state {
            SlotState::Ready(producer) => Some(Arc::clone(producer)),
            SlotState::Vacant | SlotState::Retired => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use sinkflow_testing::simplepulsar::SimplePulsar;

    use super::*;
    use crate::config::SinkConfig;

    fn options() -> ProducerOptions {
        ProducerOptions::from_config(&SinkConfig::default())
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_producer() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let first = pool.get_or_create("t", "t", &options()).await.unwrap();
        let second = pool.get_or_create("t", "t", &options()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(broker.created_producers().len(), 1);
        assert_eq!(pool.cache_keys(), vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_first_writers_create_one_producer() {
        let broker = SimplePulsar::new();
        broker.error_injector().set_create_latency(50);
        let pool = Arc::new(ProducerPool::new(broker.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.get_or_create("new-topic", "new-topic", &options())
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(broker.producers_for_topic("new-topic").len(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_get_different_producers() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let a = pool.get_or_create("t-p1", "t", &options()).await.unwrap();
        let b = pool.get_or_create("t-p2", "t", &options()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(broker.producers_for_topic("t").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_creation_leaves_no_entry() {
        let broker = SimplePulsar::new();
        broker.error_injector().fail_creates(1);
        let pool = ProducerPool::new(broker.clone());

        let result = pool.get_or_create("t", "t", &options()).await;
        assert!(matches!(result, Err(Error::ProducerCreation { .. })));
        assert!(pool.cache_keys().is_empty());
        assert!(pool.get("t").await.is_none());

        // the next attempt creates a fresh producer
        assert!(pool.get_or_create("t", "t", &options()).await.is_ok());
        assert_eq!(broker.created_producers().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_closes_and_recreates() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let first = pool.get_or_create("t", "t", &options()).await.unwrap();
        assert!(pool.evict("t", first.id).await);
        assert!(first.producer.is_closed());
        assert!(pool.get("t").await.is_none());

        let second = pool.get_or_create("t", "t", &options()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(broker.producers_for_topic("t").len(), 2);
    }

    #[tokio::test]
    async fn test_stale_evict_is_a_noop() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let first = pool.get_or_create("t", "t", &options()).await.unwrap();
        assert!(pool.evict("t", first.id).await);
        let second = pool.get_or_create("t", "t", &options()).await.unwrap();

        // a late failure of the first producer must not evict its replacement
        assert!(!pool.evict("t", first.id).await);
        assert_eq!(pool.get("t").await.unwrap().id, second.id);
        assert!(!second.producer.is_closed());
        assert_eq!(broker.close_count(first.producer.id()), 1);
    }

    #[tokio::test]
    async fn test_remove_producer_is_idempotent() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let producer = pool.get_or_create("t", "t", &options()).await.unwrap();
        pool.remove_producer("t").await;
        pool.remove_producer("t").await;
        pool.remove_producer("never-seen").await;

        assert!(pool.cache_keys().is_empty());
        assert_eq!(broker.close_count(producer.producer.id()), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let broker = SimplePulsar::new();
        let pool = ProducerPool::new(broker.clone());

        let a = pool.get_or_create("a", "a", &options()).await.unwrap();
        let b = pool.get_or_create("b", "b", &options()).await.unwrap();

        // one failing close does not stop the others
        broker.error_injector().fail_closes(1);
        pool.close_all().await;
        pool.close_all().await;

        assert_eq!(broker.close_count(a.producer.id()), 1);
        assert_eq!(broker.close_count(b.producer.id()), 1);
        assert!(pool.cache_keys().is_empty());
        assert!(matches!(
            pool.get_or_create("a", "a", &options()).await,
            Err(Error::Closed)
        ));
    }
}
