//! Secret command handler

use crate::cli::{OutputFormat, SecretAction, SecretArgs};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::redaction;
use crate::output::OutputWriter;
use keyvox_core::Provider;
use serde_json::json;
use tracing::instrument;

use super::{open_gateway, unlock};

/// Handle the secret command
#[instrument(skip_all)]
pub async fn handle_secret(args: SecretArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let gateway = open_gateway(config)?;

    match args.action {
        SecretAction::Set(set) => {
            if set.provider == Provider::Polly && !set.key.expose().contains(':') {
                return Err(Error::invalid_args(
                    "Polly keys are stored as ACCESS_KEY:SECRET_KEY",
                ));
            }
            unlock(&gateway, config, set.password.password.expose(), output).await?;
            gateway.set_secret(set.provider, set.key.expose()).await?;
            gateway.end_session().await;
            output.success(&format!("✓ Stored API key for {}", set.provider))
        }

        SecretAction::Get(get) => {
            unlock(&gateway, config, get.password.password.expose(), output).await?;
            let secret = gateway.get_secret(get.provider).await;
            gateway.end_session().await;

            let secret = secret?.ok_or_else(|| Error::ApiKeyMissing {
                provider: get.provider.to_string(),
            })?;
            let shown = if get.reveal {
                secret
            } else {
                redaction::mask_secret(&secret)
            };

            if output.format() == OutputFormat::Human {
                output.writeln(&shown)
            } else {
                output.data(&json!({ "provider": get.provider, "key": shown }))
            }
        }

        SecretAction::Remove(remove) => {
            if !gateway.vault().has_secret(remove.provider.id())? {
                return Err(Error::ApiKeyMissing {
                    provider: remove.provider.to_string(),
                });
            }
            gateway.remove_secret(remove.provider)?;
            output.success(&format!("✓ Removed API key for {}", remove.provider))
        }

        SecretAction::List => {
            let stored = gateway.list_secrets()?;
            if output.format() != OutputFormat::Human {
                return output.data(&stored);
            }

            output.section("Stored API keys")?;
            if stored.is_empty() {
                return output.info("No API keys stored");
            }
            let rows = Provider::all()
                .into_iter()
                .map(|provider| {
                    let present = stored.iter().any(|id| id == provider.id());
                    vec![
                        provider.to_string(),
                        if present { "stored" } else { "-" }.to_string(),
                    ]
                })
                .collect();
            output.table(&["Provider", "Key"], rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{PasswordArgs, SecretGetArgs, SecretRemoveArgs, SecretSetArgs, VaultAction, VaultArgs};
    use crate::handlers::handle_vault;
    use crate::handlers::test_support::{capture, config_in};
    use tempfile::TempDir;

    const PASSWORD: &str = "correct-password1";

    fn pw() -> PasswordArgs {
        PasswordArgs {
            password: PASSWORD.into(),
        }
    }

    async fn init(config: &Config) {
        let (mut output, _) = capture(OutputFormat::Human);
        let args = VaultArgs {
            action: VaultAction::Init(pw()),
        };
        handle_vault(args, config, &mut output).await.unwrap();
    }

    fn set(provider: Provider, key: &str) -> SecretArgs {
        SecretArgs {
            action: SecretAction::Set(SecretSetArgs {
                provider,
                key: key.into(),
                password: pw(),
            }),
        }
    }

    fn get(provider: Provider, reveal: bool) -> SecretArgs {
        SecretArgs {
            action: SecretAction::Get(SecretGetArgs {
                provider,
                reveal,
                password: pw(),
            }),
        }
    }

    #[tokio::test]
    async fn test_set_requires_initialized_vault() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let (mut output, _) = capture(OutputFormat::Human);

        let error = handle_secret(set(Provider::OpenAi, "sk-abc123"), &config, &mut output)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::VaultMissing { .. }));
    }

    #[tokio::test]
    async fn test_set_get_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        init(&config).await;

        let (mut output, captured) = capture(OutputFormat::Human);
        handle_secret(set(Provider::OpenAi, "sk-abcdef123456"), &config, &mut output)
            .await
            .unwrap();
        assert!(captured.text().contains("Stored API key for openai"));

        handle_secret(get(Provider::OpenAi, false), &config, &mut output)
            .await
            .unwrap();
        assert!(captured.text().contains("sk-a****"));
        assert!(!captured.text().contains("sk-abcdef123456"));

        let (mut json_output, json) = capture(OutputFormat::Json);
        handle_secret(get(Provider::OpenAi, true), &config, &mut json_output)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(json.text().trim()).unwrap();
        assert_eq!(value["key"], "sk-abcdef123456");

        let remove = SecretArgs {
            action: SecretAction::Remove(SecretRemoveArgs {
                provider: Provider::OpenAi,
            }),
        };
        handle_secret(remove, &config, &mut output).await.unwrap();

        let error = handle_secret(get(Provider::OpenAi, true), &config, &mut output)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::ApiKeyMissing { .. }));
    }

    #[tokio::test]
    async fn test_polly_key_format_checked() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        init(&config).await;
        let (mut output, _) = capture(OutputFormat::Human);

        let error = handle_secret(set(Provider::Polly, "AKIDONLY"), &config, &mut output)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgs(_)));

        handle_secret(set(Provider::Polly, "AKIDEXAMPLE:secret"), &config, &mut output)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_in_json() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        init(&config).await;
        let (mut output, _) = capture(OutputFormat::Human);
        handle_secret(set(Provider::ElevenLabs, "xi-secret"), &config, &mut output)
            .await
            .unwrap();

        let (mut json_output, json) = capture(OutputFormat::Json);
        let list = SecretArgs {
            action: SecretAction::List,
        };
        handle_secret(list, &config, &mut json_output).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(json.text().trim()).unwrap();
        assert_eq!(value, serde_json::json!(["elevenlabs"]));
    }
}
