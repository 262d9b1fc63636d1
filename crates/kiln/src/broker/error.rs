use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] kiln_core::CoreError),

    #[error("Store error: {0}")]
    StoreError(#[from] crate::store::StoreError),

    #[error("Record limit of {0} reached")]
    RecordLimitExceeded(usize),

    /// The retry after a lost creation race still found nothing to return
    #[error("Inconsistent instances for {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
