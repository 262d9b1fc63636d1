use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Client disconnected")]
    Disconnected,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
