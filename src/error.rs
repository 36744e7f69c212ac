//! # Error Types
//!
//! Custom error types for Linky Teleinfo using `thiserror`.

use thiserror::Error;

use crate::storage::StorageError;

/// Main error type for Linky Teleinfo
#[derive(Debug, Error)]
pub enum TeleinfoError {
    /// Required configuration keys are absent
    #[error("Missing config keys: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port could not be opened
    #[error("Serial error: {0}")]
    Serial(String),

    /// Reading lines from the transport failed or timed out
    #[error("Transport read error: {0}")]
    Transport(std::io::Error),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Linky Teleinfo
pub type Result<T> = std::result::Result<T, TeleinfoError>;
