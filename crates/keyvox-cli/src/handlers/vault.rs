//! Vault command handler

use crate::cli::{VaultAction, VaultArgs};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::{OutputWriter, VaultReport};
use tracing::{info, instrument};

use super::open_gateway;

/// Handle the vault command
#[instrument(skip_all, fields(vault = %config.vault.path.display()))]
pub async fn handle_vault(args: VaultArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let gateway = open_gateway(config)?;
    let vault = gateway.vault();

    match args.action {
        VaultAction::Init(password) => {
            let existed = vault.is_initialized()?;
            let spinner = output.spinner(if existed {
                "Unlocking vault..."
            } else {
                "Deriving key..."
            });
            let result = {
                let _timer = Timer::new("vault_init");
                gateway.initialize_vault(password.password.expose()).await
            };
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            result?;
            gateway.end_session().await;

            if existed {
                output.success("✓ Vault unlocked, password is correct")?;
            } else {
                info!("Vault created");
                output.success(&format!("✓ Vault created at {}", config.vault.path.display()))?;
            }
            Ok(())
        }

        VaultAction::Verify(password) => {
            if !vault.is_initialized()? {
                return Err(Error::VaultMissing {
                    path: config.vault.path.clone(),
                });
            }
            let valid = {
                let _timer = Timer::new("vault_verify");
                vault.validate_password(password.password.expose())?
            };
            if !valid {
                return Err(keyvox_core::Error::Authentication.into());
            }
            output.success("✓ Password is correct")
        }

        VaultAction::ChangePassword(change) => {
            if change.old_password == change.new_password {
                return Err(Error::invalid_args("new password must differ from the current one"));
            }
            let spinner = output.spinner("Re-encrypting stored keys...");
            let result = {
                let _timer = Timer::new("vault_change_password");
                gateway
                    .change_password(change.old_password.expose(), change.new_password.expose())
                    .await
            };
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            result?;
            gateway.end_session().await;

            let count = vault.list_secrets()?.len();
            output.success(&format!("✓ Master password changed, {} key(s) re-encrypted", count))
        }

        VaultAction::Reset(reset) => {
            if !reset.yes {
                return Err(Error::invalid_args(
                    "vault reset destroys every stored key; pass --yes to confirm",
                ));
            }
            vault.reset()?;
            output.warning("Vault reset: salt, verifier and all stored keys were removed")
        }

        VaultAction::Status => {
            let initialized = vault.is_initialized()?;
            let report = VaultReport {
                path: config.vault.path.clone(),
                initialized,
                secrets: if initialized { vault.list_secrets()? } else { Vec::new() },
            };
            output.vault(&report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ChangePasswordArgs, OutputFormat, PasswordArgs, ResetArgs};
    use crate::handlers::test_support::{capture, config_in};
    use tempfile::TempDir;

    fn password(value: &str) -> VaultArgs {
        VaultArgs {
            action: VaultAction::Init(PasswordArgs {
                password: value.into(),
            }),
        }
    }

    #[tokio::test]
    async fn test_init_creates_then_unlocks() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let (mut output, captured) = capture(OutputFormat::Human);

        handle_vault(password("pw-123456"), &config, &mut output).await.unwrap();
        assert!(captured.text().contains("Vault created"));
        assert!(config.vault.path.exists());

        handle_vault(password("pw-123456"), &config, &mut output).await.unwrap();
        assert!(captured.text().contains("Vault unlocked"));

        let error = handle_vault(password("wrong-pw"), &config, &mut output)
            .await
            .unwrap_err();
        assert_eq!(error.exit_code(), 20);
    }

    #[tokio::test]
    async fn test_verify_requires_vault() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let (mut output, _) = capture(OutputFormat::Human);

        let args = VaultArgs {
            action: VaultAction::Verify(PasswordArgs {
                password: "pw-123456".into(),
            }),
        };
        let error = handle_vault(args, &config, &mut output).await.unwrap_err();
        assert!(matches!(error, Error::VaultMissing { .. }));
    }

    #[tokio::test]
    async fn test_change_password_and_reset() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let (mut output, captured) = capture(OutputFormat::Human);

        handle_vault(password("first-pw"), &config, &mut output).await.unwrap();

        let change = VaultArgs {
            action: VaultAction::ChangePassword(ChangePasswordArgs {
                old_password: "first-pw".into(),
                new_password: "second-pw".into(),
            }),
        };
        handle_vault(change, &config, &mut output).await.unwrap();
        assert!(captured.text().contains("Master password changed"));

        let verify = VaultArgs {
            action: VaultAction::Verify(PasswordArgs {
                password: "second-pw".into(),
            }),
        };
        handle_vault(verify, &config, &mut output).await.unwrap();

        let unconfirmed = VaultArgs {
            action: VaultAction::Reset(ResetArgs { yes: false }),
        };
        let error = handle_vault(unconfirmed, &config, &mut output).await.unwrap_err();
        assert!(error.should_show_help());

        let confirmed = VaultArgs {
            action: VaultAction::Reset(ResetArgs { yes: true }),
        };
        handle_vault(confirmed, &config, &mut output).await.unwrap();

        let (mut json_output, json) = capture(OutputFormat::Json);
        let status = VaultArgs {
            action: VaultAction::Status,
        };
        handle_vault(status, &config, &mut json_output).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(json.text().trim()).unwrap();
        assert_eq!(value["initialized"], false);
    }
}
