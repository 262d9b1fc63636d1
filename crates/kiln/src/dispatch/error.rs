use kiln_core::Flavor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No dispatch settings for flavor {0}")]
    UnknownFlavor(Flavor),
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        DispatchError::Queue(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
