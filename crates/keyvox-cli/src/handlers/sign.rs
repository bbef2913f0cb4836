//! Sign command handler

use crate::cli::SignArgs;
use crate::error::{Error, Result};
use crate::logging::redaction;
use crate::output::{OutputWriter, SignatureReport};
use chrono::{DateTime, Utc};
use keyvox_core::{RequestSigner, SignableRequest, SigningContext, SigningScheme};
use tracing::{debug, instrument};

/// Handle the sign command
#[instrument(skip_all, fields(method = %args.method, url = %args.url))]
pub fn handle_sign(args: SignArgs, output: &mut OutputWriter) -> Result<()> {
    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>>>()?;

    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone().into_bytes(),
        (None, Some(path)) => {
            if !path.exists() {
                return Err(Error::FileNotFound { path: path.clone() });
            }
            std::fs::read(path)?
        }
        (None, None) => Vec::new(),
    };

    let timestamp = match &args.timestamp {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| Error::invalid_args(format!("invalid --timestamp '{}': {}", raw, e)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let scheme = if args.no_content_hash {
        SigningScheme::aws_v4().without_content_hash()
    } else {
        SigningScheme::aws_v4()
    };
    let signer = RequestSigner::new(scheme);
    let context = SigningContext::new(
        &args.access_key,
        args.secret_key.expose(),
        &args.region,
        &args.service,
        timestamp,
    );

    let signed = signer.sign(
        SignableRequest {
            method: &args.method,
            url: &args.url,
            headers: &headers,
            body: &body,
        },
        &context,
    )?;
    debug!(
        authorization = %redaction::redact_sensitive(&signed.authorization),
        "Request signed"
    );

    let show_canonical = args.show_canonical || output.verbosity() > 1;
    let report = SignatureReport {
        authorization: signed.authorization.clone(),
        signature: signed.signature.clone(),
        signed_headers: signed.signed_headers.clone(),
        headers: signed.headers.clone(),
        canonical_request: show_canonical.then(|| signed.canonical_request.clone()),
        string_to_sign: show_canonical.then(|| signed.string_to_sign.clone()),
    };
    output.signature(&report)
}

/// Parse `Name: value`
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| Error::invalid_args(format!("header '{}' is not 'Name: value'", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_args(format!("header '{}' has no name", raw)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
