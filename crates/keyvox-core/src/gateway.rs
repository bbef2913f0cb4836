//! Provider gateway
//!
//! Composes the vault, rate limiter, signer and retrying transport into a
//! single `synthesize` call:
//!
//! 1. Build the vendor request from the [`VoiceConfig`]
//! 2. Resolve the decrypted secret (fails fast, no token, no network)
//! 3. Take one rate-limit token for the vendor
//! 4. Authenticate the request (header or signature)
//! 5. Send with retry; retries reuse the same token
//! 6. Return audio bytes with cost and duration, or a classified error

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::http::cancel::Cancellation;
use crate::http::error::HttpError;
use crate::http::rate_limit::{RateLimitConfig, RateLimitStatus, RateLimiter};
use crate::http::retry::{RetryExecutor, RetryPolicy};
use crate::http::timeout::TimeoutConfig;
use crate::http::transport::{HttpTransport, ReqwestTransport};
use crate::providers::{Provider, ProviderCatalog, VoiceConfig};
use crate::signing::{RequestSigner, SigningScheme};
use crate::store::KeyValueStore;
use crate::vault::{CredentialVault, VaultOptions, VaultSession};
use crate::{Error, ErrorKind, Result};

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub retry: RetryPolicy,
    pub rate_limits: RateLimitConfig,
    pub timeouts: TimeoutConfig,
    pub providers: ProviderCatalog,
    pub vault: VaultOptions,
}

impl GatewayConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("retry", self.retry.validate()),
            ("rate_limits", self.rate_limits.validate()),
            ("timeouts", self.timeouts.validate()),
            ("vault", self.vault.validate()),
        ];
        for (section, check) in checks {
            if let Err(message) = check {
                return Err(Error::configuration(format!("{}: {}", section, message)));
            }
        }
        Ok(())
    }
}

/// Successful synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub provider: Provider,
    pub audio: Vec<u8>,
    pub content_type: Option<String>,
    pub characters_processed: usize,
    /// USD
    pub cost: f64,
    pub duration: Duration,
}

/// Flattened result for callers that want a value rather than a `Result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutcome {
    pub success: bool,
    pub audio: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub characters_processed: usize,
    pub cost: f64,
    pub duration: Duration,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

/// Entry point for authenticated, rate-limited, retried vendor calls
pub struct ProviderGateway<S> {
    vault: CredentialVault<S>,
    session: RwLock<Option<VaultSession>>,
    limiter: RateLimiter,
    signer: RequestSigner,
    retry: RetryExecutor,
    catalog: ProviderCatalog,
    transport: Arc<dyn HttpTransport>,
}

impl<S: KeyValueStore> ProviderGateway<S> {
    /// Create a gateway that talks to vendors over reqwest
    pub fn new(store: S, config: GatewayConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.timeouts)?;
        Self::with_transport(store, config, Arc::new(transport))
    }

    /// Create a gateway with a custom transport
    pub fn with_transport(
        store: S,
        config: GatewayConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            vault: CredentialVault::with_options(store, config.vault),
            session: RwLock::new(None),
            limiter: RateLimiter::new(config.rate_limits),
            signer: RequestSigner::new(SigningScheme::aws_v4()),
            retry: RetryExecutor::new(config.retry),
            catalog: config.providers,
            transport,
        })
    }

    pub fn vault(&self) -> &CredentialVault<S> {
        &self.vault
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Unlock the vault (or create it on first run) and keep the session.
    ///
    /// On [`Error::Authentication`] any existing session is left as it was.
    pub async fn initialize_vault(&self, password: &str) -> Result<()> {
        let mut slot = self.session.write().await;
        let session = self.vault.initialize(password).await?;
        *slot = Some(session);
        Ok(())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Drop the session, wiping the password from memory
    pub async fn end_session(&self) {
        if let Some(session) = self.session.write().await.take() {
            session.end();
            info!("Vault session ended");
        }
    }

    /// Change the master password and switch to the new session
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let mut slot = self.session.write().await;
        let session = self.vault.change_password(old_password, new_password).await?;
        *slot = Some(session);
        Ok(())
    }

    pub async fn set_secret(&self, provider: Provider, secret: &str) -> Result<()> {
        let slot = self.session.read().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| Error::uninitialized("unlock the vault before storing secrets"))?;
        self.vault.set_secret(session, provider.id(), secret).await
    }

    pub async fn get_secret(&self, provider: Provider) -> Result<Option<String>> {
        let slot = self.session.read().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| Error::uninitialized("unlock the vault before reading secrets"))?;
        self.vault.get_secret(session, provider.id()).await
    }

    pub fn remove_secret(&self, provider: Provider) -> Result<()> {
        self.vault.remove_secret(provider.id())
    }

    pub fn list_secrets(&self) -> Result<Vec<String>> {
        self.vault.list_secrets()
    }

    /// Current admission state for `provider`
    pub fn rate_limit_status(&self, provider: Provider) -> RateLimitStatus {
        self.limiter.peek(provider.id())
    }

    async fn resolve_secret(&self, provider: Provider) -> Result<Zeroizing<String>> {
        let slot = self.session.read().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| Error::uninitialized("no active vault session"))?;

        match self.vault.get_secret(session, provider.id()).await? {
            Some(secret) => Ok(Zeroizing::new(secret)),
            None => Err(Error::configuration(format!(
                "No API key stored for {}",
                provider
            ))),
        }
    }

    /// Synthesize `text` with the vendor named by `voice`
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
        cancel: &Cancellation,
    ) -> Result<SynthesisResult> {
        let started = Instant::now();
        let provider = voice.provider();

        let request = self.catalog.build_request(voice, text)?;
        let secret = self.resolve_secret(provider).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !self.limiter.try_consume(provider.id()) {
            let retry_after = self.limiter.time_until_available(provider.id());
            warn!(provider = %provider, retry_after_ms = retry_after.as_millis() as u64, "Request rejected by rate limiter");
            return Err(Error::RateLimited {
                provider: provider.id().to_string(),
                retry_after,
            });
        }

        // Signed once; the retry window is far shorter than signature validity
        let request = self
            .catalog
            .authorize(voice, request, &secret, &self.signer, Utc::now())?;
        drop(secret);

        debug!(provider = %provider, url = %request.url, "Sending synthesis request");

        let response = self
            .retry
            .execute(
                || self.transport.send(request.clone()),
                HttpError::is_transient,
                cancel,
            )
            .await
            .map_err(Error::from)?;

        let characters_processed = text.chars().count();
        let result = SynthesisResult {
            provider,
            audio: response.body,
            content_type: response.content_type,
            characters_processed,
            cost: self.catalog.cost(voice, characters_processed),
            duration: started.elapsed(),
        };

        info!(
            provider = %provider,
            characters = result.characters_processed,
            bytes = result.audio.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Synthesis completed"
        );
        Ok(result)
    }

    /// Like [`synthesize`](Self::synthesize), but folds errors into the outcome
    pub async fn synthesize_outcome(
        &self,
        text: &str,
        voice: &VoiceConfig,
        cancel: &Cancellation,
    ) -> SynthesisOutcome {
        let started = Instant::now();
        match self.synthesize(text, voice, cancel).await {
            Ok(result) => SynthesisOutcome {
                success: true,
                audio: Some(result.audio),
                content_type: result.content_type,
                characters_processed: result.characters_processed,
                cost: result.cost,
                duration: result.duration,
                error_kind: None,
                error_message: None,
            },
            Err(error) => {
                warn!(provider = %voice.provider(), kind = %error.kind(), "Synthesis failed: {}", error);
                SynthesisOutcome {
                    success: false,
                    audio: None,
                    content_type: None,
                    characters_processed: 0,
                    cost: 0.0,
                    duration: started.elapsed(),
                    error_kind: Some(error.kind()),
                    error_message: Some(error.to_string()),
                }
            }
        }
    }
}
