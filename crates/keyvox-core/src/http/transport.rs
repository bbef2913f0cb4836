//! HTTP transport abstraction
//!
//! The gateway talks to vendors through [`HttpTransport`] so tests and hosts
//! can substitute their own network stack. [`ReqwestTransport`] is the default.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method};

use crate::http::error::{ErrorClassification, HttpError};
use crate::http::timeout::TimeoutConfig;

/// A fully prepared outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Header pairs in insertion order; names are sent as given
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header value matching `name` case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Sends prepared requests.
///
/// Implementations return `Err` for transport failures and for any non-2xx
/// status, classified so the retry layer can decide what to do.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError>;
}

/// Transport backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Create a transport with the given timeouts
    pub fn new(timeouts: &TimeoutConfig) -> crate::Result<Self> {
        let client = timeouts
            .apply(ReqwestClient::builder())
            .build()
            .map_err(|e| crate::Error::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e.into()),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }

    fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, HttpError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HttpError::new(
                    ErrorClassification::ClientError,
                    format!("Invalid header name '{}': {}", name, e),
                )
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                HttpError::new(
                    ErrorClassification::ClientError,
                    format!("Invalid value for header '{}': {}", name, e),
                )
            })?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let headers = Self::header_map(&request.headers)?;

        let response = self
            .client
            .request(request.method, &request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(HttpError::from_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::from_status(status.as_u16(), body, retry_after));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(HttpError::from_request_error)?;

        Ok(TransportResponse {
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}
