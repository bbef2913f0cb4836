//! Keyvox Core - secure, resilient request layer for paid speech APIs
//!
//! This crate lets a backend-less client call third-party vendors directly
//! while keeping their API keys encrypted at rest.
//!
//! # Main Components
//!
//! - **Credential Vault**: master-password-derived AES-256-GCM encryption of
//!   vendor secrets over an untrusted key/value store
//! - **Request Signer**: canonical-request HMAC signatures (AWS SigV4)
//! - **Retry Executor**: exponential backoff with one-sided jitter and
//!   cancellation
//! - **Rate Limiter**: per-vendor fixed-window token buckets
//! - **Provider Gateway**: composes the above into a single `synthesize` call
//!
//! # Example
//!
//! ```no_run
//! use keyvox_core::{Cancellation, GatewayConfig, MemoryStore, Provider, ProviderGateway, VoiceConfig};
//!
//! async fn example() -> keyvox_core::Result<()> {
//!     let gateway = ProviderGateway::new(MemoryStore::new(), GatewayConfig::default())?;
//!     gateway.initialize_vault("correct-password1").await?;
//!     gateway.set_secret(Provider::OpenAi, "sk-abc123").await?;
//!
//!     let result = gateway
//!         .synthesize("Hello", &VoiceConfig::openai("alloy"), &Cancellation::new())
//!         .await?;
//!     println!("{} bytes, ${:.4}", result.audio.len(), result.cost);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gateway;
pub mod http;
pub mod providers;
pub mod signing;
pub mod store;
pub mod vault;

// Re-export main types for convenience
pub use error::{Error, ErrorKind, Result};
pub use gateway::{GatewayConfig, ProviderGateway, SynthesisOutcome, SynthesisResult};
pub use http::{
    Cancellation, ErrorClassification, HttpError, HttpTransport, RateLimitConfig,
    RateLimitStatus, RateLimiter, ReqwestTransport, RetryExecutor, RetryPolicy, TimeoutConfig,
    TransportRequest, TransportResponse, WindowLimit,
};
pub use providers::{PollyEngine, Provider, ProviderCatalog, ProviderSettings, VoiceConfig};
pub use signing::{RequestSigner, SignableRequest, SignedRequest, SigningContext, SigningScheme};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use vault::{CredentialVault, VaultOptions, VaultSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
