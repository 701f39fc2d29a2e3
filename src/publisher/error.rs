//! Error types for publishing operations

use crate::credentials::CredentialError;
use crate::error::AppError;

/// Result type for publishing operations
pub type PublisherResult<T> = std::result::Result<T, PublisherError>;

/// Errors that can occur while publishing
///
/// A broker rejection is not an error: it is absorbed into the retry registry.
/// Only the variants below ever reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// Broker connection could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Channel could not be opened or put into confirm mode
    #[error("Channel setup failed: {0}")]
    ChannelFailed(String),

    /// The publish call itself raised a transport error
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// The confirmation future resolved with an error
    #[error("Confirmation failed: {0}")]
    ConfirmationFailed(String),

    /// Missing or invalid configuration, raised before connecting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Undeliverable batch could not be handed off
    #[error("Escalation failed: {0}")]
    Escalation(String),
}

impl From<serde_json::Error> for PublisherError {
    fn from(err: serde_json::Error) -> Self {
        PublisherError::Serialization(err.to_string())
    }
}

impl From<CredentialError> for PublisherError {
    fn from(err: CredentialError) -> Self {
        PublisherError::Configuration(err.to_string())
    }
}

impl From<PublisherError> for AppError {
    fn from(err: PublisherError) -> Self {
        match err {
            PublisherError::Configuration(msg) => AppError::Configuration(msg),
            PublisherError::Serialization(msg) => AppError::Serialization(msg),
            PublisherError::Escalation(msg) => AppError::Network(msg),
            _ => AppError::Broker(err.to_string()),
        }
    }
}
