//! HTTP error classification and normalization
//!
//! Normalizes vendor-specific error responses into a uniform error format and
//! decides which failures are transient.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classification of HTTP errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Client errors (4xx) - should not retry
    ClientError,
    /// Server errors (5xx) - only 503/504 are retried
    ServerError,
    /// Connection-level failures - should retry
    NetworkError,
    /// Request or connect timeouts - should retry
    TimeoutError,
    /// Vendor-side rate limiting (429) - should retry with backoff
    RateLimitError,
    /// Authentication errors (401/403) - should not retry
    AuthenticationError,
    /// Unknown errors - default to no retry
    Unknown,
}

impl ErrorClassification {
    /// Whether this class of failure is transient regardless of status code
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::NetworkError
                | ErrorClassification::TimeoutError
                | ErrorClassification::RateLimitError
        )
    }
}

/// Status codes that signal a transient vendor condition
const TRANSIENT_STATUS_CODES: [u16; 3] = [429, 503, 504];

/// Normalized HTTP error representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpError {
    /// HTTP status code if available
    pub status_code: Option<u16>,
    /// Error classification for retry logic
    pub classification: ErrorClassification,
    /// Vendor-specific error code
    pub provider_code: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Retry-After header value (seconds) if present
    pub retry_after: Option<u64>,
}

impl HttpError {
    /// Create an error without a status code
    pub fn new(classification: ErrorClassification, message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            classification,
            provider_code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create from a non-success status and its response body
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        let details = serde_json::from_str::<Value>(&body).ok();
        let (provider_code, message) = Self::extract_provider_error(&details, &body);

        Self {
            status_code: Some(status),
            classification: Self::classify_status(status),
            provider_code,
            message,
            retry_after,
        }
    }

    /// Create from a network/request error
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() {
            ErrorClassification::TimeoutError
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ErrorClassification::NetworkError
        } else {
            ErrorClassification::Unknown
        };

        Self {
            status_code: error.status().map(|s| s.as_u16()),
            classification,
            provider_code: None,
            message: error.to_string(),
            retry_after: None,
        }
    }

    /// Classify HTTP status code
    fn classify_status(status: u16) -> ErrorClassification {
        match status {
            401 | 403 => ErrorClassification::AuthenticationError,
            429 => ErrorClassification::RateLimitError,
            400..=499 => ErrorClassification::ClientError,
            500..=599 => ErrorClassification::ServerError,
            _ => ErrorClassification::Unknown,
        }
    }

    /// Extract vendor-specific error information
    fn extract_provider_error(details: &Option<Value>, body: &str) -> (Option<String>, String) {
        if let Some(json) = details {
            // OpenAI: {"error": {"code": ..., "message": ...}}
            if let Some(error) = json.get("error").filter(|e| e.is_object()) {
                let code = error.get("code")
                    .and_then(|c| c.as_str())
                    .map(|s| s.to_string());
                let message = error.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or(body)
                    .to_string();
                return (code, message);
            }

            // ElevenLabs: {"detail": {"status": ..., "message": ...}} or {"detail": "..."}
            if let Some(detail) = json.get("detail") {
                if let Some(text) = detail.as_str() {
                    return (None, text.to_string());
                }
                let code = detail.get("status")
                    .and_then(|c| c.as_str())
                    .map(|s| s.to_string());
                let message = detail.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or(body)
                    .to_string();
                return (code, message);
            }

            // AWS JSON protocols: {"__type": ..., "message": ...}
            if let Some(message) = json.get("message")
                .or_else(|| json.get("Message"))
                .and_then(|m| m.as_str())
            {
                let code = json.get("__type")
                    .and_then(|c| c.as_str())
                    .map(|s| s.to_string());
                return (code, message.to_string());
            }
        }

        (None, body.to_string())
    }

    /// Default transient-error predicate.
    ///
    /// Network failures, timeouts and HTTP 429/503/504 are transient. Errors
    /// with no status and no classification fall back to the message text.
    pub fn is_transient(&self) -> bool {
        if self.classification.is_retryable() {
            return true;
        }
        match self.status_code {
            Some(code) => TRANSIENT_STATUS_CODES.contains(&code),
            None if self.classification == ErrorClassification::Unknown => self
                .message
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter_map(|token| token.parse::<u16>().ok())
                .any(|code| TRANSIENT_STATUS_CODES.contains(&code)),
            None => false,
        }
    }

    /// Get the error classification
    pub fn classification(&self) -> ErrorClassification {
        self.classification
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP Error [{}]: {} (classification: {:?})",
            self.status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message,
            self.classification
        )
    }
}

impl std::error::Error for HttpError {}
