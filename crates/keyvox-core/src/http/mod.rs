//! HTTP layer for vendor API communication
//!
//! This module provides:
//! - Error classification of transport failures and HTTP statuses
//! - Retry with exponential backoff and one-sided jitter
//! - Per-vendor fixed-window rate limiting
//! - Cooperative cancellation of attempts and backoff waits
//! - A pluggable transport with a reqwest implementation

pub mod cancel;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod timeout;
pub mod transport;

pub use cancel::Cancellation;
pub use error::{ErrorClassification, HttpError};
pub use rate_limit::{RateLimitConfig, RateLimitStatus, RateLimiter, WindowLimit};
pub use retry::{execute_with_retry, RetryError, RetryExecutor, RetryPolicy, JITTER_RATIO};
pub use timeout::TimeoutConfig;
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
