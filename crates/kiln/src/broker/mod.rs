pub mod error;
pub mod policy;
pub mod service;

pub use error::{BrokerError, Result};
pub use policy::{ExpiryPolicy, JobPolicy, ReusePolicy, Selection};
pub use service::{InstanceBroker, Outcome, OutcomeKind};
