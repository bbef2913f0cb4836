//! HMAC-chained request signing
//!
//! Implements the canonical-request signature protocol used by AWS (SigV4):
//!
//! 1. Canonical request from method, path, sorted query, sorted headers and
//!    the payload hash
//! 2. String-to-sign from the algorithm, timestamp, credential scope and the
//!    hash of the canonical request
//! 3. Signing key from an HMAC chain over date, region, service and terminator
//! 4. `Authorization` header carrying the credential, signed header list and
//!    hex signature
//!
//! Identical inputs always produce byte-identical output.

pub mod canonical;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use url::Url;
use zeroize::Zeroizing;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Timestamp format used in the date header and string-to-sign
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date format used in the credential scope
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Vendor constants for the signature protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningScheme {
    /// Algorithm name, first line of the string-to-sign
    pub algorithm: String,
    /// Prefix prepended to the secret key for the first HMAC
    pub key_prefix: String,
    /// Final element of the credential scope
    pub terminator: String,
    /// Header carrying the request timestamp
    pub date_header: String,
    /// Header carrying the payload hash; `None` to leave it out
    pub content_hash_header: Option<String>,
}

impl Default for SigningScheme {
    fn default() -> Self {
        Self::aws_v4()
    }
}

impl SigningScheme {
    /// AWS Signature Version 4
    pub fn aws_v4() -> Self {
        Self {
            algorithm: "AWS4-HMAC-SHA256".to_string(),
            key_prefix: "AWS4".to_string(),
            terminator: "aws4_request".to_string(),
            date_header: "x-amz-date".to_string(),
            content_hash_header: Some("x-amz-content-sha256".to_string()),
        }
    }

    /// Drop the payload-hash header
    pub fn without_content_hash(mut self) -> Self {
        self.content_hash_header = None;
        self
    }
}

/// Credentials and scope for one signed request
#[derive(Clone)]
pub struct SigningContext {
    pub access_key: String,
    pub secret_key: Zeroizing<String>,
    pub region: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl SigningContext {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: Zeroizing::new(secret_key.into()),
            region: region.into(),
            service: service.into(),
            timestamp,
        }
    }

    /// `date/region/service/terminator`
    pub fn credential_scope(&self, scheme: &SigningScheme) -> String {
        format!(
            "{}/{}/{}/{}",
            self.timestamp.format(DATE_FORMAT),
            self.region,
            self.service,
            scheme.terminator
        )
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("access key", self.access_key.as_str()),
            ("secret key", self.secret_key.as_str()),
            ("region", self.region.as_str()),
            ("service", self.service.as_str()),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::signature(format!("{} cannot be empty", name)));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// The parts of a request that are covered by the signature
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: &'a [(String, String)],
    pub body: &'a [u8],
}

/// Result of signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Headers to send: the caller's, plus host, timestamp, payload hash and
    /// `Authorization`, with the exact values that were signed
    pub headers: Vec<(String, String)>,
    pub authorization: String,
    pub signature: String,
    pub signed_headers: String,
    pub canonical_request: String,
    pub string_to_sign: String,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::signature(format!("Invalid HMAC key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes request signatures for a [`SigningScheme`]
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    scheme: SigningScheme,
}

impl RequestSigner {
    pub fn new(scheme: SigningScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &SigningScheme {
        &self.scheme
    }

    /// Derive the signing key for the context's date, region and service
    pub fn signing_key(&self, context: &SigningContext) -> Result<Zeroizing<Vec<u8>>> {
        let date = context.timestamp.format(DATE_FORMAT).to_string();
        let seed = Zeroizing::new(format!("{}{}", self.scheme.key_prefix, context.secret_key.as_str()));

        let k_date = Zeroizing::new(hmac(seed.as_bytes(), &date)?);
        let k_region = Zeroizing::new(hmac(&k_date, &context.region)?);
        let k_service = Zeroizing::new(hmac(&k_region, &context.service)?);
        Ok(Zeroizing::new(hmac(&k_service, &self.scheme.terminator)?))
    }

    /// Sign `request`.
    ///
    /// Adds `host` (when absent), the timestamp header and, if the scheme
    /// uses one, the payload-hash header before canonicalization. Any
    /// `Authorization` or timestamp header supplied by the caller is replaced.
    pub fn sign(&self, request: SignableRequest<'_>, context: &SigningContext) -> Result<SignedRequest> {
        context.validate()?;
        if request.method.trim().is_empty() {
            return Err(Error::signature("method cannot be empty"));
        }

        let url = Url::parse(request.url)
            .map_err(|e| Error::signature(format!("Invalid URL '{}': {}", request.url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::signature(format!("URL '{}' has no host", request.url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let timestamp = context.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let payload_hash = canonical::hash_hex(request.body);

        let replaced = |name: &str| {
            name.eq_ignore_ascii_case("authorization")
                || name.eq_ignore_ascii_case(&self.scheme.date_header)
                || self
                    .scheme
                    .content_hash_header
                    .as_deref()
                    .is_some_and(|h| name.eq_ignore_ascii_case(h))
        };

        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !replaced(name))
            .cloned()
            .collect();

        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("host")) {
            headers.push(("host".to_string(), host));
        }
        headers.push((self.scheme.date_header.clone(), timestamp.clone()));
        if let Some(hash_header) = &self.scheme.content_hash_header {
            headers.push((hash_header.clone(), payload_hash.clone()));
        }

        let (canonical_request, signed_headers) =
            canonical::canonical_request(request.method, &url, &headers, &payload_hash);

        let scope = context.credential_scope(&self.scheme);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            self.scheme.algorithm,
            timestamp,
            scope,
            canonical::hash_hex(canonical_request.as_bytes())
        );

        let key = self.signing_key(context)?;
        let signature = hex::encode(hmac(&key, &string_to_sign)?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.scheme.algorithm, context.access_key, scope, signed_headers, signature
        );
        headers.push(("Authorization".to_string(), authorization.clone()));

        tracing::debug!(
            service = %context.service,
            region = %context.region,
            signed_headers = %signed_headers,
            "Signed request"
        );

        Ok(SignedRequest {
            headers,
            authorization,
            signature,
            signed_headers,
            canonical_request,
            string_to_sign,
        })
    }
}
