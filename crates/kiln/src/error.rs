//! Error types for the kiln crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),

    #[error("Build error: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, KilnError>;
