use kiln_core::InstanceId;
use thiserror::Error;

use crate::broker::BrokerError;
use crate::dispatch::DispatchError;
use crate::platform::PlatformError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(InstanceId),

    #[error("Job {0} is still running")]
    RunningJobExists(InstanceId),

    #[error("At most {0} jobs may be kept")]
    RecordLimitExceeded(usize),

    #[error("Job {0} cannot be terminated in status {1}")]
    CannotTerminate(InstanceId, String),

    #[error("Job {0} has no {1} yet")]
    NotReady(InstanceId, &'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Broker error: {0}")]
    Broker(BrokerError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl From<BrokerError> for JobError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::RecordLimitExceeded(limit) => JobError::RecordLimitExceeded(limit),
            BrokerError::InvalidRequest(e) => JobError::InvalidInput(e.to_string()),
            e => JobError::Broker(e),
        }
    }
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => JobError::NotFound(InstanceId::from_string(id)),
            e => JobError::Store(e),
        }
    }
}

impl From<kiln_core::CoreError> for JobError {
    fn from(e: kiln_core::CoreError) -> Self {
        JobError::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
