//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Args, Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use keyvox_core::{PollyEngine, Provider, VoiceConfig};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Keyvox CLI - encrypted vendor credentials and resilient speech synthesis
///
/// Stores API keys for paid speech vendors under a master password and calls
/// the vendors directly with rate limiting, retries and request signing.
#[derive(Parser, Debug)]
#[command(
    name = "keyvox",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "KEYVOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the vault file (overrides the configuration)
    #[arg(long, global = true, env = "KEYVOX_VAULT")]
    pub vault: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, unlock-check, re-key or reset the credential vault
    Vault(VaultArgs),

    /// Store, read and remove vendor API keys
    Secret(SecretArgs),

    /// Compute a SigV4 signature for a request
    Sign(SignArgs),

    /// Synthesize speech with a vendor
    Synthesize(SynthesizeArgs),

    /// Show rate-limit status per vendor
    Limits(LimitsArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// A password or key given on the command line; never shown in debug output
#[derive(Clone, PartialEq, Eq)]
pub struct SecretArg(String);

impl SecretArg {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for SecretArg {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for SecretArg {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SecretArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Commands {
    /// Subcommand name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Vault(_) => "vault",
            Commands::Secret(_) => "secret",
            Commands::Sign(_) => "sign",
            Commands::Synthesize(_) => "synthesize",
            Commands::Limits(_) => "limits",
            Commands::Completions(_) => "completions",
        }
    }
}

/// Master password input shared by commands that unlock the vault
#[derive(Args, Debug, Clone)]
pub struct PasswordArgs {
    /// Master password
    #[arg(long, env = "KEYVOX_PASSWORD", hide_env_values = true)]
    pub password: SecretArg,
}

/// Arguments for the vault command
#[derive(Parser, Debug)]
pub struct VaultArgs {
    #[command(subcommand)]
    pub action: VaultAction,
}

/// Vault management actions
#[derive(Subcommand, Debug)]
pub enum VaultAction {
    /// Create the vault, or unlock an existing one
    Init(PasswordArgs),

    /// Check a master password against the stored verifier
    Verify(PasswordArgs),

    /// Re-encrypt every stored key under a new master password
    ChangePassword(ChangePasswordArgs),

    /// Delete the salt, verifier and every stored key
    Reset(ResetArgs),

    /// Show whether the vault is initialized and which keys it holds
    Status,
}

/// Arguments for vault change-password
#[derive(Parser, Debug)]
pub struct ChangePasswordArgs {
    /// Current master password
    #[arg(long, env = "KEYVOX_PASSWORD", hide_env_values = true)]
    pub old_password: SecretArg,

    /// New master password
    #[arg(long, env = "KEYVOX_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: SecretArg,
}

/// Arguments for vault reset
#[derive(Parser, Debug)]
pub struct ResetArgs {
    /// Confirm that all stored keys should be destroyed
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for the secret command
#[derive(Parser, Debug)]
pub struct SecretArgs {
    #[command(subcommand)]
    pub action: SecretAction,
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Encrypt and store an API key
    Set(SecretSetArgs),

    /// Decrypt and print an API key
    Get(SecretGetArgs),

    /// Remove a stored API key
    Remove(SecretRemoveArgs),

    /// List vendors with a stored key
    List,
}

/// Arguments for secret set
#[derive(Parser, Debug)]
pub struct SecretSetArgs {
    /// Vendor the key belongs to
    #[arg(value_parser = parse_provider)]
    pub provider: Provider,

    /// API key (Polly keys are ACCESS_KEY:SECRET_KEY)
    #[arg(long, env = "KEYVOX_API_KEY", hide_env_values = true)]
    pub key: SecretArg,

    #[command(flatten)]
    pub password: PasswordArgs,
}

/// Arguments for secret get
#[derive(Parser, Debug)]
pub struct SecretGetArgs {
    /// Vendor whose key to read
    #[arg(value_parser = parse_provider)]
    pub provider: Provider,

    /// Print the full key instead of a masked preview
    #[arg(long)]
    pub reveal: bool,

    #[command(flatten)]
    pub password: PasswordArgs,
}

/// Arguments for secret remove
#[derive(Parser, Debug)]
pub struct SecretRemoveArgs {
    /// Vendor whose key to remove
    #[arg(value_parser = parse_provider)]
    pub provider: Provider,
}

/// Arguments for the sign command
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Request URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "POST")]
    pub method: String,

    /// Extra header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long, value_name = "FILE")]
    pub body_file: Option<PathBuf>,

    /// Access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key: String,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: SecretArg,

    /// Signing region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Signing service
    #[arg(long, default_value = "polly")]
    pub service: String,

    /// Signing time (RFC 3339), defaults to now
    #[arg(long)]
    pub timestamp: Option<String>,

    /// Omit the x-amz-content-sha256 header
    #[arg(long)]
    pub no_content_hash: bool,

    /// Also print the canonical request and string to sign
    #[arg(long)]
    pub show_canonical: bool,
}

/// Arguments for the synthesize command
#[derive(Parser, Debug)]
pub struct SynthesizeArgs {
    /// Text to synthesize
    #[arg(value_name = "TEXT", required_unless_present = "file")]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Vendor to call
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: Provider,

    /// Voice id (ElevenLabs, Polly) or voice name (OpenAI)
    #[arg(long)]
    pub voice: String,

    /// Model id (ElevenLabs, OpenAI)
    #[arg(long)]
    pub model: Option<String>,

    /// Polly engine
    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    /// Polly region
    #[arg(long)]
    pub region: Option<String>,

    /// OpenAI speaking speed (0.25 to 4.0)
    #[arg(long)]
    pub speed: Option<f32>,

    /// ElevenLabs stability (0.0 to 1.0)
    #[arg(long)]
    pub stability: Option<f32>,

    /// ElevenLabs similarity boost (0.0 to 1.0)
    #[arg(long)]
    pub similarity_boost: Option<f32>,

    /// Where to write the audio
    #[arg(long = "out", value_name = "AUDIO_FILE")]
    pub out: PathBuf,

    #[command(flatten)]
    pub password: PasswordArgs,
}

/// Arguments for the limits command
#[derive(Parser, Debug)]
pub struct LimitsArgs {
    /// Only show this vendor
    #[arg(value_parser = parse_provider)]
    pub provider: Option<Provider>,
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

/// Polly engines
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    Standard,
    Neural,
    LongForm,
    Generative,
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    value.parse::<Provider>().map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl SynthesizeArgs {
    /// Build the vendor voice configuration from the flags
    pub fn voice_config(&self) -> VoiceConfig {
        let mut voice = match self.provider {
            Provider::ElevenLabs => VoiceConfig::elevenlabs(&self.voice),
            Provider::OpenAi => VoiceConfig::openai(&self.voice),
            Provider::Polly => VoiceConfig::polly(&self.voice),
        };

        match &mut voice {
            VoiceConfig::ElevenLabs {
                model_id,
                stability,
                similarity_boost,
                ..
            } => {
                if let Some(model) = &self.model {
                    *model_id = model.clone();
                }
                *stability = self.stability;
                *similarity_boost = self.similarity_boost;
            }
            VoiceConfig::OpenAi { model, speed, .. } => {
                if let Some(name) = &self.model {
                    *model = name.clone();
                }
                *speed = self.speed;
            }
            VoiceConfig::Polly { engine, region, .. } => {
                if let Some(selected) = self.engine {
                    *engine = selected.into();
                }
                *region = self.region.clone();
            }
        }
        voice
    }
}

impl From<EngineArg> for PollyEngine {
    fn from(engine: EngineArg) -> Self {
        match engine {
            EngineArg::Standard => PollyEngine::Standard,
            EngineArg::Neural => PollyEngine::Neural,
            EngineArg::LongForm => PollyEngine::LongForm,
            EngineArg::Generative => PollyEngine::Generative,
        }
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}
