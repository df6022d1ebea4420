//! Error injection controller for testing.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Controller for injecting errors during testing.
///
/// This allows tests to force specific error conditions like a topic that refuses new
/// producers, a broker that rejects published messages, or a producer that fails to close.
#[derive(Debug, Default)]
pub struct ErrorInjector {
    /// Fail the next N producer creations.
    fail_next_creates: AtomicUsize,
    /// Fail the next N sends while enqueuing.
    fail_next_sends: AtomicUsize,
    /// Fail the next N publishes when the broker answers.
    fail_next_publishes: AtomicUsize,
    /// Fail the next N producer closes.
    fail_next_closes: AtomicUsize,
    /// Artificial producer creation latency in milliseconds.
    create_latency_ms: AtomicU64,
    /// Artificial broker answer latency in milliseconds.
    publish_latency_ms: AtomicU64,
    /// Every producer's pending queue is full until drained.
    queue_full: AtomicBool,
    queue_drained: Notify,
}

impl ErrorInjector {
    /// Create a new error injector with all errors disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next N producer creations.
    pub fn fail_creates(&self, count: usize) {
        self.fail_next_creates.store(count, Ordering::Relaxed);
    }

    /// Fail the next N sends before the message is enqueued.
    pub fn fail_sends(&self, count: usize) {
        self.fail_next_sends.store(count, Ordering::Relaxed);
    }

    /// Reject the next N enqueued messages when the broker answers.
    pub fn fail_publishes(&self, count: usize) {
        self.fail_next_publishes.store(count, Ordering::Relaxed);
    }

    /// Fail the next N producer closes.
    pub fn fail_closes(&self, count: usize) {
        self.fail_next_closes.store(count, Ordering::Relaxed);
    }

    /// Set artificial producer creation latency.
    pub fn set_create_latency(&self, ms: u64) {
        self.create_latency_ms.store(ms, Ordering::Relaxed);
    }

    /// Set artificial latency between enqueue and broker answer.
    pub fn set_publish_latency(&self, ms: u64) {
        self.publish_latency_ms.store(ms, Ordering::Relaxed);
    }

    /// Makes every producer's pending queue full. Sends either wait or fail, depending on
    /// whether the producer blocks on a full queue.
    pub fn fill_queue(&self) {
        self.queue_full.store(true, Ordering::Release);
    }

    /// Frees the queue and wakes every waiting send.
    pub fn drain_queue(&self) {
        self.queue_full.store(false, Ordering::Release);
        self.queue_drained.notify_waiters();
    }

    pub(crate) fn is_queue_full(&self) -> bool {
        self.queue_full.load(Ordering::Acquire)
    }

    /// Returns once the queue has room.
    pub(crate) async fn wait_for_queue(&self) {
        loop {
            let drained = self.queue_drained.notified();
            if !self.is_queue_full() {
                return;
            }
            drained.await;
        }
    }

    pub(crate) fn should_fail_create(&self) -> bool {
        Self::decrement_counter(&self.fail_next_creates)
    }

    pub(crate) fn should_fail_send(&self) -> bool {
        Self::decrement_counter(&self.fail_next_sends)
    }

    pub(crate) fn should_fail_publish(&self) -> bool {
        Self::decrement_counter(&self.fail_next_publishes)
    }

    pub(crate) fn should_fail_close(&self) -> bool {
        Self::decrement_counter(&self.fail_next_closes)
    }

    pub(crate) fn create_latency(&self) -> Duration {
        Duration::from_millis(self.create_latency_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn publish_latency(&self) -> Duration {
        Duration::from_millis(self.publish_latency_ms.load(Ordering::Relaxed))
    }

    /// Helper to decrement a counter and return true if it was > 0.
    fn decrement_counter(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c > 0 { Some(c - 1) } else { None }
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_countdowns() {
        let injector = ErrorInjector::new();
        assert!(!injector.should_fail_create());
        assert!(!injector.should_fail_send());
        assert!(!injector.should_fail_publish());
        assert!(!injector.should_fail_close());

        injector.fail_creates(2);
        assert!(injector.should_fail_create());
        assert!(injector.should_fail_create());
        assert!(!injector.should_fail_create());

        injector.fail_publishes(1);
        assert!(injector.should_fail_publish());
        assert!(!injector.should_fail_publish());

        // Reset by setting to 0
        injector.fail_sends(5);
        assert!(injector.should_fail_send());
        injector.fail_sends(0);
        assert!(!injector.should_fail_send());
    }

    #[test]
    fn test_independent_failure_counters() {
        let injector = ErrorInjector::new();

        injector.fail_publishes(1);
        injector.fail_closes(2);

        assert!(injector.should_fail_publish());
        assert!(!injector.should_fail_publish());
        assert!(injector.should_fail_close());
        assert!(injector.should_fail_close());
        assert!(!injector.should_fail_close());
    }

    #[tokio::test]
    async fn test_queue_fill_and_drain() {
        let injector = std::sync::Arc::new(ErrorInjector::new());
        assert!(!injector.is_queue_full());
        injector.wait_for_queue().await;

        injector.fill_queue();
        assert!(injector.is_queue_full());
        let waiter = tokio::spawn({
            let injector = std::sync::Arc::clone(&injector);
            async move { injector.wait_for_queue().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        injector.drain_queue();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!injector.is_queue_full());
    }

    #[test]
    fn test_latency_settings() {
        let injector = ErrorInjector::new();
        assert_eq!(injector.publish_latency(), Duration::ZERO);

        injector.set_create_latency(100);
        injector.set_publish_latency(200);

        assert_eq!(injector.create_latency(), Duration::from_millis(100));
        assert_eq!(injector.publish_latency(), Duration::from_millis(200));
    }
}
