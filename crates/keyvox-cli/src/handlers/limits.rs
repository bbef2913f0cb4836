//! Limits command handler

use crate::cli::LimitsArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::{LimitReport, OutputWriter};
use keyvox_core::Provider;

use super::open_gateway;

/// Handle the limits command
pub fn handle_limits(args: LimitsArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let gateway = open_gateway(config)?;

    let providers = match args.provider {
        Some(provider) => vec![provider],
        None => Provider::all().to_vec(),
    };
    let limits = providers
        .into_iter()
        .map(|provider| LimitReport::new(provider, gateway.rate_limit_status(provider)))
        .collect::<Vec<_>>();

    output.limits(&limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::handlers::test_support::{capture, config_in};
    use keyvox_core::WindowLimit;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_limits_reflect_configuration() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.rate_limits = config
            .rate_limits
            .clone()
            .with_provider_limit("polly", WindowLimit::new(5, Duration::from_secs(1)));

        let (mut output, captured) = capture(OutputFormat::Json);
        handle_limits(LimitsArgs { provider: None }, &config, &mut output).unwrap();

        let value: serde_json::Value = serde_json::from_str(captured.text().trim()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        let polly = rows.iter().find(|row| row["provider"] == "polly").unwrap();
        assert_eq!(polly["capacity"], 5);
        assert_eq!(polly["remaining"], 5);
    }

    #[test]
    fn test_single_provider_table() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());

        let (mut output, captured) = capture(OutputFormat::Human);
        let args = LimitsArgs {
            provider: Some(Provider::ElevenLabs),
        };
        handle_limits(args, &config, &mut output).unwrap();

        let text = captured.text();
        assert!(text.contains("elevenlabs"));
        assert!(text.contains("60/60"));
        assert!(!text.contains("openai"));
    }
}
