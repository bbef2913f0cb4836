//! Speech vendors and their request shapes
//!
//! Each vendor authenticates differently:
//! - ElevenLabs: `xi-api-key` header
//! - OpenAI: bearer token
//! - Amazon Polly: SigV4 signature, secret stored as `ACCESS_KEY:SECRET_KEY`
//!
//! Responses are returned as raw audio bytes; nothing here parses them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use zeroize::Zeroizing;

use crate::http::transport::TransportRequest;
use crate::signing::{RequestSigner, SignableRequest, SigningContext};
use crate::{Error, Result};

/// Region used for Polly when neither the voice nor the settings name one
pub const DEFAULT_POLLY_REGION: &str = "us-east-1";

/// Supported speech vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    ElevenLabs,
    OpenAi,
    Polly,
}

/// How a vendor expects requests to be authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Secret in a vendor-specific header
    ApiKeyHeader(&'static str),
    /// `Authorization: Bearer <secret>`
    Bearer,
    /// Canonical-request HMAC signature for the named service
    Signature { service: &'static str },
}

impl Provider {
    pub fn all() -> [Provider; 3] {
        [Provider::ElevenLabs, Provider::OpenAi, Provider::Polly]
    }

    /// Stable identifier used for vault entries and rate-limit keys
    pub fn id(&self) -> &'static str {
        match self {
            Provider::ElevenLabs => "elevenlabs",
            Provider::OpenAi => "openai",
            Provider::Polly => "polly",
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Provider::ElevenLabs => AuthScheme::ApiKeyHeader("xi-api-key"),
            Provider::OpenAi => AuthScheme::Bearer,
            Provider::Polly => AuthScheme::Signature { service: "polly" },
        }
    }

    /// Longest input a single request accepts
    pub fn max_characters(&self) -> usize {
        match self {
            Provider::ElevenLabs => 5_000,
            Provider::OpenAi => 4_096,
            Provider::Polly => 3_000,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" | "eleven-labs" => Ok(Provider::ElevenLabs),
            "openai" | "open_ai" => Ok(Provider::OpenAi),
            "polly" | "aws" | "amazon" => Ok(Provider::Polly),
            other => Err(Error::configuration(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Polly synthesis engines, priced differently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollyEngine {
    Standard,
    #[default]
    Neural,
    LongForm,
    Generative,
}

impl PollyEngine {
    /// Wire name in the request body
    pub fn as_str(&self) -> &'static str {
        match self {
            PollyEngine::Standard => "standard",
            PollyEngine::Neural => "neural",
            PollyEngine::LongForm => "long-form",
            PollyEngine::Generative => "generative",
        }
    }

    /// USD per 1,000 characters
    pub fn price_per_1k_chars(&self) -> f64 {
        match self {
            PollyEngine::Standard => 0.004,
            PollyEngine::Neural => 0.016,
            PollyEngine::LongForm => 0.1,
            PollyEngine::Generative => 0.03,
        }
    }
}

fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_openai_model() -> String {
    "tts-1".to_string()
}

fn default_output_format() -> String {
    "mp3".to_string()
}

/// Vendor-specific voice parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VoiceConfig {
    ElevenLabs {
        voice_id: String,
        #[serde(default = "default_elevenlabs_model")]
        model_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stability: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        similarity_boost: Option<f32>,
    },
    OpenAi {
        voice: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f32>,
        #[serde(default = "default_output_format")]
        response_format: String,
    },
    Polly {
        voice_id: String,
        #[serde(default)]
        engine: PollyEngine,
        #[serde(default = "default_output_format")]
        output_format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
}

impl VoiceConfig {
    pub fn provider(&self) -> Provider {
        match self {
            VoiceConfig::ElevenLabs { .. } => Provider::ElevenLabs,
            VoiceConfig::OpenAi { .. } => Provider::OpenAi,
            VoiceConfig::Polly { .. } => Provider::Polly,
        }
    }

    /// Convenience constructor with default model and settings
    pub fn elevenlabs(voice_id: impl Into<String>) -> Self {
        VoiceConfig::ElevenLabs {
            voice_id: voice_id.into(),
            model_id: default_elevenlabs_model(),
            stability: None,
            similarity_boost: None,
        }
    }

    /// Convenience constructor with the `tts-1` model and mp3 output
    pub fn openai(voice: impl Into<String>) -> Self {
        VoiceConfig::OpenAi {
            voice: voice.into(),
            model: default_openai_model(),
            speed: None,
            response_format: default_output_format(),
        }
    }

    /// Convenience constructor with the neural engine and mp3 output
    pub fn polly(voice_id: impl Into<String>) -> Self {
        VoiceConfig::Polly {
            voice_id: voice_id.into(),
            engine: PollyEngine::default(),
            output_format: default_output_format(),
            region: None,
        }
    }

    fn validate(&self) -> Result<()> {
        let voice = match self {
            VoiceConfig::ElevenLabs { voice_id, .. } => voice_id,
            VoiceConfig::OpenAi { voice, .. } => voice,
            VoiceConfig::Polly { voice_id, .. } => voice_id,
        };
        if voice.trim().is_empty() {
            return Err(Error::configuration(format!(
                "{} voice cannot be empty",
                self.provider()
            )));
        }
        if let VoiceConfig::OpenAi { speed: Some(speed), .. } = self {
            if !(0.25..=4.0).contains(speed) {
                return Err(Error::configuration(format!(
                    "OpenAI speed {} is outside 0.25..=4.0",
                    speed
                )));
            }
        }
        Ok(())
    }
}

/// Per-vendor endpoint and pricing settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Override the vendor's API base URL
    pub base_url: Option<String>,
    /// Override the built-in price, USD per 1,000 characters
    pub price_per_1k_chars: Option<f64>,
    /// Default region for region-scoped vendors
    pub region: Option<String>,
}

impl ProviderSettings {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_price(mut self, price_per_1k_chars: f64) -> Self {
        self.price_per_1k_chars = Some(price_per_1k_chars);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Settings for every vendor, keyed by [`Provider`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCatalog {
    providers: HashMap<Provider, ProviderSettings>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, provider: Provider, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }

    pub fn settings(&self, provider: Provider) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }

    /// Region used for a Polly request
    pub fn polly_region(&self, voice: &VoiceConfig) -> String {
        if let VoiceConfig::Polly { region: Some(region), .. } = voice {
            return region.clone();
        }
        self.settings(Provider::Polly)
            .region
            .unwrap_or_else(|| DEFAULT_POLLY_REGION.to_string())
    }

    /// API base URL for the voice's vendor, without a trailing slash
    pub fn base_url(&self, voice: &VoiceConfig) -> String {
        let provider = voice.provider();
        let url = match self.settings(provider).base_url {
            Some(url) => url,
            None => match provider {
                Provider::ElevenLabs => "https://api.elevenlabs.io".to_string(),
                Provider::OpenAi => "https://api.openai.com".to_string(),
                Provider::Polly => format!("https://polly.{}.amazonaws.com", self.polly_region(voice)),
            },
        };
        url.trim_end_matches('/').to_string()
    }

    /// USD per 1,000 characters for this voice
    pub fn price_per_1k_chars(&self, voice: &VoiceConfig) -> f64 {
        if let Some(price) = self.settings(voice.provider()).price_per_1k_chars {
            return price;
        }
        match voice {
            VoiceConfig::ElevenLabs { .. } => 0.30,
            VoiceConfig::OpenAi { model, .. } if model == "tts-1-hd" => 0.030,
            VoiceConfig::OpenAi { .. } => 0.015,
            VoiceConfig::Polly { engine, .. } => engine.price_per_1k_chars(),
        }
    }

    /// Cost of synthesizing `characters` characters
    pub fn cost(&self, voice: &VoiceConfig, characters: usize) -> f64 {
        characters as f64 / 1000.0 * self.price_per_1k_chars(voice)
    }

    /// Build the unauthenticated synthesis request
    pub fn build_request(&self, voice: &VoiceConfig, text: &str) -> Result<TransportRequest> {
        voice.validate()?;

        let provider = voice.provider();
        let characters = text.chars().count();
        if text.trim().is_empty() {
            return Err(Error::configuration("Text to synthesize cannot be empty"));
        }
        if characters > provider.max_characters() {
            return Err(Error::configuration(format!(
                "{} accepts at most {} characters per request, got {}",
                provider,
                provider.max_characters(),
                characters
            )));
        }

        let base_url = self.base_url(voice);
        let (url, accept, body) = match voice {
            VoiceConfig::ElevenLabs {
                voice_id,
                model_id,
                stability,
                similarity_boost,
            } => (
                format!("{}/v1/text-to-speech/{}", base_url, voice_id),
                "audio/mpeg",
                json!({
                    "text": text,
                    "model_id": model_id,
                    "voice_settings": {
                        "stability": stability.unwrap_or(0.5),
                        "similarity_boost": similarity_boost.unwrap_or(0.75),
                    },
                }),
            ),
            VoiceConfig::OpenAi {
                voice,
                model,
                speed,
                response_format,
            } => {
                let mut body = json!({
                    "model": model,
                    "input": text,
                    "voice": voice,
                    "response_format": response_format,
                });
                if let Some(speed) = speed {
                    body["speed"] = json!(speed);
                }
                (format!("{}/v1/audio/speech", base_url), "audio/*", body)
            }
            VoiceConfig::Polly {
                voice_id,
                engine,
                output_format,
                ..
            } => (
                format!("{}/v1/speech", base_url),
                "audio/*",
                json!({
                    "Engine": engine.as_str(),
                    "OutputFormat": output_format,
                    "Text": text,
                    "TextType": "text",
                    "VoiceId": voice_id,
                }),
            ),
        };

        Ok(TransportRequest::new(Method::POST, url)
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .body(serde_json::to_vec(&body)?))
    }

    /// Attach credentials to `request` in the vendor's scheme.
    ///
    /// `secret` is the decrypted vault entry. Signed requests use `now` as the
    /// signature timestamp.
    pub fn authorize(
        &self,
        voice: &VoiceConfig,
        request: TransportRequest,
        secret: &str,
        signer: &RequestSigner,
        now: DateTime<Utc>,
    ) -> Result<TransportRequest> {
        match voice.provider().auth_scheme() {
            AuthScheme::ApiKeyHeader(header) => Ok(request.header(header, secret)),
            AuthScheme::Bearer => Ok(request.header("Authorization", format!("Bearer {}", secret))),
            AuthScheme::Signature { service } => {
                let (access_key, secret_key) = split_key_pair(secret)?;
                let context = SigningContext::new(
                    access_key,
                    secret_key.as_str(),
                    self.polly_region(voice),
                    service,
                    now,
                );
                let signed = signer.sign(
                    SignableRequest {
                        method: request.method.as_str(),
                        url: &request.url,
                        headers: &request.headers,
                        body: &request.body,
                    },
                    &context,
                )?;
                Ok(TransportRequest {
                    headers: signed.headers,
                    ..request
                })
            }
        }
    }
}

/// Split a stored `ACCESS_KEY:SECRET_KEY` pair
fn split_key_pair(secret: &str) -> Result<(String, Zeroizing<String>)> {
    match secret.split_once(':') {
        Some((access, key)) if !access.trim().is_empty() && !key.trim().is_empty() => Ok((
            access.trim().to_string(),
            Zeroizing::new(key.trim().to_string()),
        )),
        _ => Err(Error::configuration(
            "Polly credentials must be stored as ACCESS_KEY:SECRET_KEY",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn body_json(request: &TransportRequest) -> serde_json::Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[test]
    fn test_provider_ids_round_trip() {
        for provider in Provider::all() {
            assert_eq!(provider.id().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("google".parse::<Provider>().is_err());
    }

    #[test]
    fn test_voice_config_tagged_serialization() {
        let voice: VoiceConfig =
            serde_json::from_str(r#"{"provider":"polly","voice_id":"Joanna","engine":"long-form"}"#)
                .unwrap();
        assert_eq!(
            voice,
            VoiceConfig::Polly {
                voice_id: "Joanna".to_string(),
                engine: PollyEngine::LongForm,
                output_format: "mp3".to_string(),
                region: None,
            }
        );

        let json = serde_json::to_value(VoiceConfig::openai("alloy")).unwrap();
        assert_eq!(json["provider"], "openai");
        assert_eq!(json["model"], "tts-1");
    }

    #[test]
    fn test_cost() {
        let catalog = ProviderCatalog::new();
        assert!((catalog.cost(&VoiceConfig::openai("alloy"), 2_000) - 0.03).abs() < 1e-9);
        assert!((catalog.cost(&VoiceConfig::polly("Joanna"), 1_000) - 0.016).abs() < 1e-9);

        let catalog = catalog.with_settings(
            Provider::ElevenLabs,
            ProviderSettings::default().with_price(0.18),
        );
        assert!((catalog.cost(&VoiceConfig::elevenlabs("v1"), 500) - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_elevenlabs_request() {
        let catalog = ProviderCatalog::new();
        let voice = VoiceConfig::elevenlabs("21m00Tcm4TlvDq8ikWAM");
        let request = catalog.build_request(&voice, "Hello there").unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.url,
            "https://api.elevenlabs.io/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM"
        );
        let body = body_json(&request);
        assert_eq!(body["text"], "Hello there");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");

        let signer = RequestSigner::default();
        let request = catalog
            .authorize(&voice, request, "xi-secret", &signer, Utc::now())
            .unwrap();
        assert_eq!(request.header_value("xi-api-key"), Some("xi-secret"));
    }

    #[test]
    fn test_openai_request() {
        let catalog = ProviderCatalog::new().with_settings(
            Provider::OpenAi,
            ProviderSettings::default().with_base_url("http://localhost:1234/"),
        );
        let voice = VoiceConfig::OpenAi {
            voice: "nova".to_string(),
            model: "tts-1-hd".to_string(),
            speed: Some(1.25),
            response_format: "opus".to_string(),
        };
        let request = catalog.build_request(&voice, "Hi").unwrap();
        assert_eq!(request.url, "http://localhost:1234/v1/audio/speech");

        let body = body_json(&request);
        assert_eq!(body["input"], "Hi");
        assert_eq!(body["speed"], 1.25);
        assert_eq!(body["response_format"], "opus");

        let request = catalog
            .authorize(&voice, request, "sk-abc123", &RequestSigner::default(), Utc::now())
            .unwrap();
        assert_eq!(request.header_value("authorization"), Some("Bearer sk-abc123"));
    }

    #[test]
    fn test_polly_request_is_signed() {
        let catalog = ProviderCatalog::new();
        let voice = VoiceConfig::Polly {
            voice_id: "Matthew".to_string(),
            engine: PollyEngine::Standard,
            output_format: "ogg_vorbis".to_string(),
            region: Some("eu-west-1".to_string()),
        };
        let request = catalog.build_request(&voice, "Chapter one").unwrap();
        assert_eq!(request.url, "https://polly.eu-west-1.amazonaws.com/v1/speech");
        assert_eq!(body_json(&request)["Engine"], "standard");

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let signed = catalog
            .authorize(&voice, request, "AKIDEXAMPLE:topsecret", &RequestSigner::default(), now)
            .unwrap();

        let authorization = signed.header_value("authorization").unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/eu-west-1/polly/aws4_request"
        ));
        assert_eq!(signed.header_value("x-amz-date"), Some("20240301T093000Z"));
        assert_eq!(
            signed.header_value("host"),
            Some("polly.eu-west-1.amazonaws.com")
        );
    }

    #[test]
    fn test_polly_requires_key_pair() {
        let catalog = ProviderCatalog::new();
        let voice = VoiceConfig::polly("Joanna");
        let request = catalog.build_request(&voice, "x").unwrap();
        let error = catalog
            .authorize(&voice, request, "no-colon", &RequestSigner::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(error, Error::Configuration { .. }));
    }

    #[test]
    fn test_input_validation() {
        let catalog = ProviderCatalog::new();
        assert!(catalog.build_request(&VoiceConfig::openai("alloy"), "  ").is_err());
        assert!(catalog.build_request(&VoiceConfig::openai(""), "hi").is_err());

        let long = "a".repeat(Provider::Polly.max_characters() + 1);
        assert!(catalog.build_request(&VoiceConfig::polly("Joanna"), &long).is_err());
    }

    #[test]
    fn test_catalog_deserializes_from_map() {
        let catalog: ProviderCatalog = serde_json::from_str(
            r#"{"polly": {"region": "ap-southeast-2"}, "openai": {"price_per_1k_chars": 0.02}}"#,
        )
        .unwrap();
        assert_eq!(catalog.polly_region(&VoiceConfig::polly("Olivia")), "ap-southeast-2");
        assert_eq!(catalog.price_per_1k_chars(&VoiceConfig::openai("alloy")), 0.02);
    }
}
