//! Main crate for Kiln, the ephemeral compute-instance broker
//!
//! Decides whether a provisioned instance can be shared, creates new ones
//! without duplicates under concurrent requests, hands provisioning to the
//! execution platform through a queue and follows the results it reports.

pub mod app;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod evaluate;
pub mod inference;
pub mod job;
pub mod notifier;
pub mod platform;
pub mod reconciler;
pub mod service;
pub mod store;

// Re-export core types
pub use kiln_core::{
    Clock, CoreError, DetailPatch, Flavor, Instance, InstanceDetail, InstanceId, JobHandle,
    RequestIndex, SystemClock,
};

pub use app::{Kiln, KilnBuilder};
pub use config::KilnConfig;
pub use error::{KilnError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::Kiln;
    pub use crate::broker::{InstanceBroker, Outcome, OutcomeKind};
    pub use crate::store::InstanceStore;
    pub use kiln_core::{DetailPatch, Flavor, Instance, InstanceId, RequestIndex};
}
