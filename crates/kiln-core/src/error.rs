//! Error types for kiln-core

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid request index: {0}")]
    InvalidIndex(String),

    #[error("Invalid detail patch: {0}")]
    InvalidPatch(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
