use async_trait::async_trait;
use std::time::Duration;

use super::{Delivery, DispatchMessage, Result};

/// Hand-off channel between request handlers and the dispatch worker.
///
/// Delivery is at least once: a consumed message that is never acknowledged
/// may be seen again, so handlers must be idempotent.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Enqueue a message without waiting for it to be handled
    async fn publish(&self, message: DispatchMessage) -> Result<()>;

    /// Wait for the next message; `None` once the queue is closed
    async fn consume(&self) -> Result<Option<Delivery>>;

    /// Mark a delivery as handled
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Give a delivery back unhandled; it is consumed again after `delay`
    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<()>;
}
