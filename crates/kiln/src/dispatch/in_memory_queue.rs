use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use super::{Delivery, DispatchError, DispatchMessage, DispatchQueue, Result};

/// Process-local queue; messages are lost on restart
#[derive(Clone, Default)]
pub struct InMemoryDispatchQueue {
    messages: Arc<Mutex<VecDeque<Delivery>>>,
    notify: Arc<Notify>,
    next_id: Arc<AtomicI64>,
    closed: Arc<AtomicBool>,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting to be consumed
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Copy of the waiting messages, oldest first
    pub async fn peek(&self) -> Vec<DispatchMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }

    /// Stop accepting messages and wake consumers once drained
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn push(&self, delivery: Delivery) {
        self.messages.lock().await.push_back(delivery);
        self.notify.notify_one();
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn publish(&self, message: DispatchMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Queue("queue is closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(Delivery { id, message }).await;
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Delivery>> {
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.messages.lock().await.pop_front() {
                return Ok(Some(delivery));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            notified.await;
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<()> {
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            self.push(delivery.clone()).await;
            return Ok(());
        }

        let queue = self.clone();
        let delivery = delivery.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.push(delivery).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{InstanceId, RequestIndex};
    use std::time::Duration;

    fn message(id: &str) -> DispatchMessage {
        DispatchMessage::provision(
            RequestIndex::finetune("alice").unwrap(),
            InstanceId::from_string(id),
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryDispatchQueue::new();
        queue.publish(message("a")).await.unwrap();
        queue.publish(message("b")).await.unwrap();
        assert_eq!(queue.len().await, 2);

        let first = queue.consume().await.unwrap().unwrap();
        let second = queue.consume().await.unwrap().unwrap();
        assert_eq!(first.message.instance_id().as_str(), "a");
        assert_eq!(second.message.instance_id().as_str(), "b");
        assert!(first.id < second.id);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let queue = InMemoryDispatchQueue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.publish(message("late")).await.unwrap();

        let delivery = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.message.instance_id().as_str(), "late");
    }

    #[tokio::test]
    async fn test_release_offers_delivery_again() {
        let queue = InMemoryDispatchQueue::new();
        queue.publish(message("a")).await.unwrap();

        let first = queue.consume().await.unwrap().unwrap();
        assert!(queue.is_empty().await);

        queue.release(&first, Duration::ZERO).await.unwrap();
        let again = queue.consume().await.unwrap().unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_delay() {
        let queue = InMemoryDispatchQueue::new();
        queue.publish(message("a")).await.unwrap();
        let first = queue.consume().await.unwrap().unwrap();

        queue.release(&first, Duration::from_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(queue.is_empty().await);

        let again = queue.consume().await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = InMemoryDispatchQueue::new();
        queue.publish(message("a")).await.unwrap();
        queue.close();

        assert!(queue.publish(message("b")).await.is_err());
        assert!(queue.consume().await.unwrap().is_some());
        assert!(queue.consume().await.unwrap().is_none());
    }
}
