use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Platform rejected the request: {0}")]
    Rejected(String),

    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PlatformError::InvalidResponse(e.to_string())
        } else {
            PlatformError::Unavailable(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
