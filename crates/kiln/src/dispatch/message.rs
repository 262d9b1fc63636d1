use kiln_core::{InstanceId, RequestIndex};
use serde::{Deserialize, Serialize};

/// Work handed from request handlers to the dispatch worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchMessage {
    /// Start a platform job for a freshly created instance
    Provision {
        index: RequestIndex,
        instance_id: InstanceId,
    },
    /// Keep a reused instance alive for `survival_secs` more seconds
    ExtendExpiry {
        index: RequestIndex,
        instance_id: InstanceId,
        survival_secs: i64,
    },
}

impl DispatchMessage {
    pub fn provision(index: RequestIndex, instance_id: InstanceId) -> Self {
        DispatchMessage::Provision { index, instance_id }
    }

    pub fn extend_expiry(index: RequestIndex, instance_id: InstanceId, survival_secs: i64) -> Self {
        DispatchMessage::ExtendExpiry {
            index,
            instance_id,
            survival_secs,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchMessage::Provision { .. } => "provision",
            DispatchMessage::ExtendExpiry { .. } => "extend_expiry",
        }
    }

    pub fn index(&self) -> &RequestIndex {
        match self {
            DispatchMessage::Provision { index, .. } => index,
            DispatchMessage::ExtendExpiry { index, .. } => index,
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        match self {
            DispatchMessage::Provision { instance_id, .. } => instance_id,
            DispatchMessage::ExtendExpiry { instance_id, .. } => instance_id,
        }
    }
}

/// A message taken from a queue, to be acknowledged once handled
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: i64,
    pub message: DispatchMessage,
}
