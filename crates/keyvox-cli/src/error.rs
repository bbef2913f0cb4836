//! Error types and handling for the CLI
//!
//! Core failures are wrapped as-is so their exit code can follow the
//! stable [`keyvox_core::ErrorKind`].

use keyvox_core::ErrorKind;
use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from keyvox-core library
    #[error("{0}")]
    Core(#[from] keyvox_core::Error),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Invalid file format
    #[error("Invalid file format for {}: expected {} format", path.display(), expected)]
    InvalidFormat { path: PathBuf, expected: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument combination
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// The command needs an initialized vault
    #[error("No vault at {}. Run 'keyvox vault init' first", path.display())]
    VaultMissing { path: PathBuf },

    /// No key stored for the vendor
    #[error("No API key stored for '{}'. Set one with 'keyvox secret set {}'", provider, provider)]
    ApiKeyMissing { provider: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(core) => core_exit_code(core.kind()),
            Self::FileNotFound { .. } => 3,
            Self::InvalidFormat { .. } => 4,
            Self::Config(_) => 5,
            Self::InvalidArgs(_) => 6,
            Self::VaultMissing { .. } => 7,
            Self::ApiKeyMissing { .. } => 9,
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::Toml(_) => 14,
            Self::Other { .. } => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::InvalidArgs(_))
    }
}

fn core_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Configuration => 5,
        ErrorKind::Uninitialized => 7,
        ErrorKind::Authentication => 20,
        ErrorKind::Decryption => 21,
        ErrorKind::Signature => 22,
        ErrorKind::RateLimited => 30,
        ErrorKind::ExhaustedRetries => 31,
        ErrorKind::Permanent => 32,
        ErrorKind::Cancelled => 130,
        ErrorKind::Storage => 40,
        ErrorKind::Internal => 2,
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    let hint = match error {
        Error::Core(core) if core.is_credential_problem() => {
            Some("check the master password, or re-enter the affected API key")
        }
        Error::Core(keyvox_core::Error::RateLimited { .. }) => {
            Some("wait for the next window or raise the limit in the configuration")
        }
        _ => None,
    };

    let mut message = if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    };

    if let Some(hint) = hint {
        if use_color {
            use colored::Colorize;
            message.push_str(&format!("\n  {} {}", "hint:".yellow(), hint));
        } else {
            message.push_str(&format!("\n  hint: {}", hint));
        }
    }
    message
}
