pub mod error;
pub mod in_memory_queue;
pub mod message;
pub mod postgres_queue;
pub mod queue;
pub mod worker;

pub use error::{DispatchError, Result};
pub use in_memory_queue::InMemoryDispatchQueue;
pub use message::{Delivery, DispatchMessage};
pub use postgres_queue::PostgresDispatchQueue;
pub use queue::DispatchQueue;
pub use worker::{DispatchSettings, DispatchWorker};
