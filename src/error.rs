//! Error types for clinicstore
//!
//! Every failure the dual-store engine can surface is one variant of
//! [`Error`]. Remote failures are usually swallowed by the repository and
//! never reach the caller; local failures are the operation's failure.

use crate::validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for clinicstore operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Remote Entity Service
    // ==========================================================================
    #[error("Remote service unavailable: {message}")]
    RemoteUnavailable { message: String },

    // ==========================================================================
    // Local Collection Store
    // ==========================================================================
    #[error("Collection '{collection}' is locked by another writer")]
    WriteLocked { collection: String },

    #[error("Collection '{collection}' is corrupt: {message}")]
    StoreCorrupt { collection: String, message: String },

    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Record Errors
    // ==========================================================================
    #[error("Record '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Invariant violated in collection '{collection}': {message}")]
    InvariantViolation { collection: String, message: String },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid {kind} '{value}' ({reason})")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Reserved name '{name}' cannot be used")]
    ReservedName { name: String },

    // ==========================================================================
    // Configuration & Credentials
    // ==========================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Credential error: {message}")]
    Credential { message: String },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for clinicstore operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Error::Credential {
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Rejected {
                kind,
                value,
                reason,
            } => Error::InvalidIdentifier {
                kind: kind.as_str(),
                value,
                reason,
            },
            ValidationError::Reserved(name) => Error::ReservedName { name },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::RemoteUnavailable { .. } => {
                Some("Check the network connection and the remote url/api_key in the config")
            }
            Error::WriteLocked { .. } => {
                Some("Close any program that has the collection file open and retry")
            }
            Error::StoreCorrupt { .. } => {
                Some("Restore the collection file from a backup or remove it to start empty")
            }
            Error::NotFound { .. } => Some("Check the record ID and collection name"),
            Error::InvariantViolation { .. } => {
                Some("Create another administrator before removing this one")
            }
            Error::InvalidIdentifier { .. } => {
                Some("Use only letters, numbers, underscores, and hyphens")
            }
            _ => None,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable { .. }
                | Error::WriteLocked { .. }
                | Error::NotFound { .. }
                | Error::InvalidIdentifier { .. }
        )
    }

    /// Returns true if the error came from the remote service
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteUnavailable { .. })
    }

    pub(crate) fn remote(message: impl Into<String>) -> Self {
        Error::RemoteUnavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::WriteLocked {
            collection: "patients".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Collection 'patients' is locked by another writer"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::NotFound {
            collection: "staff".to_string(),
            id: "abc".to_string(),
        };
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_remote_classification() {
        assert!(Error::remote("timeout").is_remote());
        assert!(Error::remote("timeout").is_recoverable());

        let corrupt = Error::StoreCorrupt {
            collection: "labs".to_string(),
            message: "bad json".to_string(),
        };
        assert!(!corrupt.is_remote());
        assert!(!corrupt.is_recoverable());
    }
}
