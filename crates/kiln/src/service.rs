//! Pieces shared by the short-lived flavor services

use kiln_core::{Instance, InstanceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{BrokerError, Outcome, OutcomeKind};
use crate::dispatch::DispatchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] kiln_core::CoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// What a client learns about an instance right after asking for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceView {
    pub instance_id: InstanceId,
    pub error: Option<String>,
    pub access_url: Option<String>,
    pub expiry: i64,
    /// The request created this instance rather than sharing one
    pub created: bool,
}

impl InstanceView {
    pub fn new(instance: &Instance, created: bool) -> Self {
        Self {
            instance_id: instance.id.clone(),
            error: instance.detail.error.clone(),
            access_url: instance.detail.access_url.clone(),
            expiry: instance.detail.expiry,
            created,
        }
    }
}

impl From<&Outcome> for InstanceView {
    fn from(outcome: &Outcome) -> Self {
        Self::new(&outcome.instance, outcome.kind == OutcomeKind::Created)
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}
