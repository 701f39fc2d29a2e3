//! Error types for credential storage

use crate::error::AppError;

/// Result type for credential operations
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Errors that can occur while reading or writing credentials
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// A required key has never been set, or has expired
    #[error("Credential {0} is not set")]
    Missing(String),

    /// Value rejected before it reached the store
    #[error("Setting {key} as {value:?} is not supported")]
    Unsupported { key: String, value: String },

    /// Value present but unusable
    #[error("Credential {key} is invalid: {reason}")]
    Invalid { key: String, reason: String },

    /// Backing store failure
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Encoding error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for CredentialError {
    fn from(err: sled::Error) -> Self {
        CredentialError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for CredentialError {
    fn from(err: bincode::Error) -> Self {
        CredentialError::Serialization(err.to_string())
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing(_)
            | CredentialError::Invalid { .. }
            | CredentialError::Unsupported { .. } => AppError::Configuration(err.to_string()),
            CredentialError::Storage(msg) => AppError::Storage(msg),
            CredentialError::Serialization(msg) => AppError::Serialization(msg),
        }
    }
}
