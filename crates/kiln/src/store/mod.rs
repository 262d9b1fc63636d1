pub mod error;
pub mod in_memory_repository;
pub mod postgres_repository;
pub mod repository;

pub use error::{Result, StoreError};
pub use in_memory_repository::InMemoryInstanceStore;
pub use postgres_repository::PostgresInstanceStore;
pub use repository::{IndexDocument, InstanceStore, Snapshot};
