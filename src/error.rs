use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors (missing credentials, unreadable config files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Broker errors that escaped the retry path
    #[error("Broker error: {0}")]
    Broker(String),

    /// Credential storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Source collection errors
    #[error("Source error ({source_name}): {message}")]
    Source { source_name: String, message: String },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Network(_) => "NETWORK_ERROR",
            AppError::Broker(_) => "BROKER_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Source { .. } => "SOURCE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the operator has to act before a rerun can succeed
    pub fn is_operator_error(&self) -> bool {
        matches!(self, AppError::Configuration(_))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from reqwest::Error
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Configuration("test".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            AppError::Broker("test".to_string()).error_code(),
            "BROKER_ERROR"
        );
        assert_eq!(
            AppError::Source {
                source_name: "7-zip".to_string(),
                message: "boom".to_string()
            }
            .error_code(),
            "SOURCE_ERROR"
        );
    }

    #[test]
    fn test_operator_errors() {
        assert!(AppError::Configuration("missing".to_string()).is_operator_error());
        assert!(!AppError::Network("down".to_string()).is_operator_error());
        assert!(!AppError::Storage("locked".to_string()).is_operator_error());
    }

    #[test]
    fn test_source_error_display() {
        let err = AppError::Source {
            source_name: "7-zip".to_string(),
            message: "no rows".to_string(),
        };
        assert_eq!(err.to_string(), "Source error (7-zip): no rows");
    }
}
