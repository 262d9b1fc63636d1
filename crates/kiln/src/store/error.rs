use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Version mismatch for {index}: expected {expected}")]
    VersionConflict { index: String, expected: u64 },

    #[error("Index document already exists: {0}")]
    DocumentExists(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl StoreError {
    /// A concurrent creator won the race for this document
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::DocumentExists(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
