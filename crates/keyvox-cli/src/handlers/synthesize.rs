//! Synthesize command handler

use crate::cli::SynthesizeArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{redaction, timing::Timer};
use crate::output::{OutputWriter, SynthesisReport};
use keyvox_core::Cancellation;
use std::fs;
use tracing::{debug, info, instrument, warn};

use super::{open_gateway, unlock};

/// Handle the synthesize command
#[instrument(skip_all, fields(provider = %args.provider, out = %args.out.display()))]
pub async fn handle_synthesize(
    args: SynthesizeArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let text = read_text(&args)?;
    let voice = args.voice_config();
    if let Ok(mut voice_json) = serde_json::to_value(&voice) {
        redaction::redact_json_value(&mut voice_json);
        debug!(voice = %voice_json, characters = text.chars().count(), "Synthesis requested");
    }

    let gateway = open_gateway(config)?;
    unlock(&gateway, config, args.password.password.expose(), output).await?;

    // Ctrl-C aborts the request or the backoff wait in progress
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let spinner = output.spinner(&format!("Synthesizing with {}...", args.provider));
    let result = {
        let _timer = Timer::with_details("synthesize", args.provider.id());
        gateway.synthesize(&text, &voice, &cancel).await
    };
    watcher.abort();
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    gateway.end_session().await;
    let result = result?;

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&args.out, &result.audio)?;
    info!(bytes = result.audio.len(), path = %args.out.display(), "Audio written");

    let report = SynthesisReport {
        provider: result.provider,
        output_path: args.out.clone(),
        bytes: result.audio.len(),
        content_type: result.content_type,
        characters_processed: result.characters_processed,
        cost_usd: result.cost,
        duration_ms: result.duration.as_millis() as u64,
    };
    output.synthesis(&report)
}

fn read_text(args: &SynthesizeArgs) -> Result<String> {
    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            if !path.exists() {
                return Err(Error::FileNotFound { path: path.clone() });
            }
            fs::read_to_string(path)?
        }
        (None, None) => return Err(Error::invalid_args("provide TEXT or --file")),
    };

    if text.trim().is_empty() {
        return Err(Error::invalid_args("nothing to synthesize: text is empty"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{OutputFormat, PasswordArgs, SecretAction, SecretArgs, SecretSetArgs, VaultAction, VaultArgs};
    use crate::handlers::test_support::{capture, config_in};
    use crate::handlers::{handle_secret, handle_vault};
    use keyvox_core::{Provider, ProviderSettings};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const PASSWORD: &str = "correct-password1";

    fn pw() -> PasswordArgs {
        PasswordArgs {
            password: PASSWORD.into(),
        }
    }

    fn synth_args(out: PathBuf) -> SynthesizeArgs {
        SynthesizeArgs {
            text: Some("Chapter one".to_string()),
            file: None,
            provider: Provider::OpenAi,
            voice: "alloy".to_string(),
            model: None,
            engine: None,
            region: None,
            speed: None,
            stability: None,
            similarity_boost: None,
            out,
            password: pw(),
        }
    }

    async fn prepared_config(dir: &Path, base_url: &str) -> Config {
        let mut config = config_in(dir);
        config.providers = config
            .providers
            .clone()
            .with_settings(Provider::OpenAi, ProviderSettings::default().with_base_url(base_url));
        config.retry.initial_delay_ms = 5;
        config.retry.max_delay_ms = 10;

        let (mut output, _) = capture(OutputFormat::Human);
        handle_vault(VaultArgs { action: VaultAction::Init(pw()) }, &config, &mut output)
            .await
            .unwrap();
        let set = SecretArgs {
            action: SecretAction::Set(SecretSetArgs {
                provider: Provider::OpenAi,
                key: "sk-abc123".into(),
                password: pw(),
            }),
        };
        handle_secret(set, &config, &mut output).await.unwrap();
        config
    }

    #[tokio::test]
    async fn test_synthesize_writes_audio_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/audio/speech")
            .match_header("authorization", "Bearer sk-abc123")
            .with_status(200)
            .with_header("content-type", "audio/mpeg")
            .with_body(b"ID3fake-mp3")
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = prepared_config(dir.path(), &server.url()).await;
        let out = dir.path().join("audio").join("chapter-1.mp3");

        let (mut output, captured) = capture(OutputFormat::Json);
        handle_synthesize(synth_args(out.clone()), &config, &mut output)
            .await
            .unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"ID3fake-mp3");
        let value: serde_json::Value = serde_json::from_str(captured.text().trim()).unwrap();
        assert_eq!(value["provider"], "openai");
        assert_eq!(value["characters_processed"], 11);
        assert_eq!(value["content_type"], "audio/mpeg");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_permanent_failure_writes_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/audio/speech")
            .with_status(400)
            .with_body(r#"{"error":{"message":"Invalid voice"}}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = prepared_config(dir.path(), &server.url()).await;
        let out = dir.path().join("never.mp3");

        let (mut output, _) = capture(OutputFormat::Human);
        let error = handle_synthesize(synth_args(out.clone()), &config, &mut output)
            .await
            .unwrap_err();

        assert_eq!(error.exit_code(), 32);
        assert!(!out.exists());
        mock.assert_async().await;
    }

    #[test]
    fn test_read_text_from_file_and_reject_blank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.txt");
        fs::write(&path, "Once upon a time").unwrap();

        let mut args = synth_args(dir.path().join("out.mp3"));
        args.text = None;
        args.file = Some(path);
        assert_eq!(read_text(&args).unwrap(), "Once upon a time");

        args.file = None;
        args.text = Some("   ".to_string());
        assert!(matches!(read_text(&args), Err(Error::InvalidArgs(_))));
    }
}
