//! Error types for the Keyvox core library
//!
//! Every failure in this crate resolves to a value of [`Error`]. Nothing here is
//! fatal to the host process: the worst outcome is a failed individual request
//! or an unusable credential that the caller can prompt for again.

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::error::HttpError;

/// Main error type for Keyvox operations
#[derive(Error, Debug)]
pub enum Error {
    /// The vault has no active session, or was never set up on this store
    #[error("Vault is not initialized: {message}")]
    Uninitialized { message: String },

    /// The supplied master password does not match the stored verifier
    #[error("Authentication failed: master password does not match")]
    Authentication,

    /// A stored secret could not be decrypted (wrong key, tampering or corruption)
    #[error("Decryption failed: {message}")]
    Decryption { message: String },

    /// Local admission denial; no network attempt was made
    #[error("Rate limit reached for {provider}, next window in {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    /// Request signing inputs were malformed
    #[error("Signature error: {message}")]
    Signature { message: String },

    /// Retries were exhausted; wraps the last transient failure
    #[error("Retries exhausted after {attempts} attempt(s): {last}")]
    ExhaustedRetries { attempts: u32, last: HttpError },

    /// A non-retryable failure (e.g. 4xx other than 429)
    #[error("Permanent error: {0}")]
    Permanent(HttpError),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Missing secrets, unknown providers, invalid settings
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Key/value store failures
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, serializable classification of an [`Error`] for callers that only
/// need to decide what to show or do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Uninitialized,
    Authentication,
    Decryption,
    RateLimited,
    Signature,
    ExhaustedRetries,
    Permanent,
    Cancelled,
    Configuration,
    Storage,
    Internal,
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a signature error
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Create a decryption error
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Create an uninitialized-vault error
    pub fn uninitialized(message: impl Into<String>) -> Self {
        Self::Uninitialized {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Uninitialized { .. } => ErrorKind::Uninitialized,
            Error::Authentication => ErrorKind::Authentication,
            Error::Decryption { .. } => ErrorKind::Decryption,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Signature { .. } => ErrorKind::Signature,
            Error::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            Error::Permanent(_) => ErrorKind::Permanent,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Storage { .. } | Error::Io { .. } => ErrorKind::Storage,
            Error::Json { .. } | Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the credential involved should be treated as unusable and
    /// re-entered by the user
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self,
            Error::Authentication | Error::Decryption { .. } | Error::Uninitialized { .. }
        )
    }

    /// HTTP status code of the underlying transport failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Permanent(e) => e.status_code,
            Error::ExhaustedRetries { last, .. } => last.status_code,
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Uninitialized => "uninitialized",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Decryption => "decryption",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Signature => "signature",
            ErrorKind::ExhaustedRetries => "exhausted_retries",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorClassification;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("no secret stored for elevenlabs");
        assert_eq!(
            err.to_string(),
            "Configuration error: no secret stored for elevenlabs"
        );
        assert_eq!(
            Error::Authentication.to_string(),
            "Authentication failed: master password does not match"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::decryption("bad tag").kind(), ErrorKind::Decryption);
        assert_eq!(
            Error::RateLimited {
                provider: "openai".to_string(),
                retry_after: Duration::from_secs(3),
            }
            .kind(),
            ErrorKind::RateLimited
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(Error::from(io).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_credential_problems() {
        assert!(Error::Authentication.is_credential_problem());
        assert!(Error::decryption("x").is_credential_problem());
        assert!(!Error::Cancelled.is_credential_problem());
    }

    #[test]
    fn test_status_code_passthrough() {
        let last = HttpError::from_status(503, "unavailable".to_string(), None);
        let err = Error::ExhaustedRetries { attempts: 3, last };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);

        let permanent = HttpError::new(ErrorClassification::ClientError, "bad request");
        assert_eq!(Error::Permanent(permanent).status_code(), None);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ExhaustedRetries).unwrap();
        assert_eq!(json, "\"exhausted_retries\"");
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
    }
}
