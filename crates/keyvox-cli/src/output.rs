//! Output formatting and writing utilities
//!
//! This module formats command results as JSON, YAML or human-readable
//! text, and drives progress spinners for network calls.

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::logging::redaction;
use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use keyvox_core::{Provider, RateLimitStatus};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace};

/// Result of a synthesize command; the audio itself goes to a file
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    pub provider: Provider,
    pub output_path: PathBuf,
    pub bytes: usize,
    pub content_type: Option<String>,
    pub characters_processed: usize,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Rate-limit state of one vendor
#[derive(Debug, Clone, Serialize)]
pub struct LimitReport {
    pub provider: Provider,
    pub remaining: u32,
    pub capacity: u32,
    pub reset_in_ms: u64,
    pub reset_at: DateTime<Utc>,
}

impl LimitReport {
    pub fn new(provider: Provider, status: RateLimitStatus) -> Self {
        Self {
            provider,
            remaining: status.remaining,
            capacity: status.capacity,
            reset_in_ms: status.reset_in.as_millis() as u64,
            reset_at: status.reset_at,
        }
    }
}

/// Headers and intermediate values of a computed signature
#[derive(Debug, Clone, Serialize)]
pub struct SignatureReport {
    pub authorization: String,
    pub signature: String,
    pub signed_headers: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_to_sign: Option<String>,
}

/// Vault summary for `vault status`
#[derive(Debug, Clone, Serialize)]
pub struct VaultReport {
    pub path: PathBuf,
    pub initialized: bool,
    pub secrets: Vec<String>,
}

/// Trait for formatting output with specialized support for command results
pub trait OutputFormatter {
    /// Format a serializable value
    fn format<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Format a synthesis report
    fn format_synthesis(&self, report: &SynthesisReport) -> Result<String>;

    /// Format rate-limit rows
    fn format_limits(&self, limits: &[LimitReport]) -> Result<String>;

    /// Format a computed signature
    fn format_signature(&self, report: &SignatureReport) -> Result<String>;

    /// Format a vault summary
    fn format_vault(&self, report: &VaultReport) -> Result<String>;
}

impl OutputFormatter for OutputFormat {
    fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => Ok(serde_json::to_string(value)?),
            OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            OutputFormat::Human => Ok(serde_json::to_string_pretty(value)?),
        }
    }

    fn format_synthesis(&self, report: &SynthesisReport) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_synthesis_human(report)),
            _ => self.format(report),
        }
    }

    fn format_limits(&self, limits: &[LimitReport]) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_limits_human(limits)),
            _ => self.format(&limits),
        }
    }

    fn format_signature(&self, report: &SignatureReport) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_signature_human(report)),
            _ => self.format(report),
        }
    }

    fn format_vault(&self, report: &VaultReport) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_vault_human(report)),
            _ => self.format(report),
        }
    }
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    show_progress: bool,
    quiet: bool,
    verbose: u8,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool, verbose: u8) -> Self {
        Self {
            format,
            use_color,
            show_progress: !quiet && io::stderr().is_terminal(),
            quiet,
            verbose,
            writer: Box::new(io::stdout()),
        }
    }

    /// Create an output writer with a custom writer
    pub fn with_writer(
        format: OutputFormat,
        use_color: bool,
        quiet: bool,
        verbose: u8,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            use_color,
            show_progress: false, // No progress bars with custom writers
            quiet,
            verbose,
            writer,
        }
    }

    /// Get the output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Get verbosity level
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// Write raw output
    pub fn write(&mut self, content: &str) -> Result<()> {
        write!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write an info message
    pub fn info(&mut self, message: &str) -> Result<()> {
        debug!("Output info: {}", redaction::redact_sensitive(message));

        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&format!("{} {}", "ℹ".blue(), message))
        } else {
            self.writeln(&format!("INFO: {}", message))
        }
    }

    /// Write a success message
    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.green().to_string())
        } else {
            self.writeln(message)
        }
    }

    /// Write a warning message
    pub fn warning(&mut self, message: &str) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.yellow().to_string())
        } else {
            self.writeln(&format!("WARNING: {}", message))
        }
    }

    /// Write a section header
    pub fn section(&mut self, title: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        self.writeln("")?;
        if self.use_color {
            self.writeln(&format!("═══ {} ═══", title).bright_blue().to_string())
        } else {
            self.writeln(&format!("=== {} ===", title))
        }
    }

    /// Write data in the configured format
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let mut value_json = serde_json::to_value(value)?;
        redaction::redact_json_value(&mut value_json);
        trace!("Outputting data: {}", value_json);

        let formatted = self.format.format(value)?;
        self.emit(&formatted)
    }

    /// Write a synthesis report
    pub fn synthesis(&mut self, report: &SynthesisReport) -> Result<()> {
        let formatted = self.format.format_synthesis(report)?;
        self.emit(&formatted)
    }

    /// Write rate-limit rows
    pub fn limits(&mut self, limits: &[LimitReport]) -> Result<()> {
        let formatted = self.format.format_limits(limits)?;
        self.emit(&formatted)
    }

    /// Write a signature report
    pub fn signature(&mut self, report: &SignatureReport) -> Result<()> {
        let formatted = self.format.format_signature(report)?;
        self.emit(&formatted)
    }

    /// Write a vault summary
    pub fn vault(&mut self, report: &VaultReport) -> Result<()> {
        let formatted = self.format.format_vault(report)?;
        self.emit(&formatted)
    }

    fn emit(&mut self, formatted: &str) -> Result<()> {
        if self.format == OutputFormat::Human || self.format == OutputFormat::Json {
            self.writeln(formatted.trim_end())
        } else {
            self.write(formatted)
        }
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(default_spinner_style());
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }

    /// Write a table (for human format)
    pub fn table(&mut self, headers: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        let rendered = render_table(headers, &rows);
        let mut lines = rendered.lines();
        if let Some(header_row) = lines.next() {
            if self.use_color {
                self.writeln(&header_row.bold().to_string())?;
            } else {
                self.writeln(header_row)?;
            }
        }
        for line in lines {
            self.writeln(line)?;
        }
        Ok(())
    }
}

/// Helper function to create a spinner style
pub fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}

/// Render rows under headers with padded columns
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let pad = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = *width),
                None => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![pad(headers.iter().map(|h| h.to_string()).collect())];
    lines.push(
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
    );
    for row in rows {
        lines.push(pad(row.clone()));
    }
    lines.join("\n")
}

fn format_synthesis_human(report: &SynthesisReport) -> String {
    let mut output = String::new();

    output.push_str("═══ Synthesis Result ═══\n\n");
    output.push_str(&format!("  Provider: {}\n", report.provider));
    output.push_str(&format!("  Characters: {}\n", report.characters_processed));
    output.push_str(&format!("  Cost: ${:.4}\n", report.cost_usd));
    output.push_str(&format!("  Duration: {}ms\n", report.duration_ms));
    output.push_str(&format!(
        "  Audio: {} ({})\n",
        report.output_path.display(),
        format_bytes(report.bytes)
    ));
    if let Some(content_type) = &report.content_type {
        output.push_str(&format!("  Content-Type: {}\n", content_type));
    }

    output
}

fn format_limits_human(limits: &[LimitReport]) -> String {
    let rows = limits
        .iter()
        .map(|limit| {
            vec![
                limit.provider.to_string(),
                format!("{}/{}", limit.remaining, limit.capacity),
                format_duration_ms(limit.reset_in_ms),
                limit.reset_at.format("%H:%M:%S UTC").to_string(),
            ]
        })
        .collect::<Vec<_>>();

    render_table(&["Provider", "Remaining", "Resets in", "Resets at"], &rows)
}

fn format_signature_human(report: &SignatureReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Signature: {}\n", report.signature));
    output.push_str(&format!("SignedHeaders: {}\n", report.signed_headers));
    output.push_str("\nHeaders:\n");
    for (name, value) in &report.headers {
        output.push_str(&format!("  {}: {}\n", name, value));
    }

    if let Some(canonical) = &report.canonical_request {
        output.push_str("\nCanonical request:\n");
        output.push_str(canonical);
        output.push('\n');
    }
    if let Some(string_to_sign) = &report.string_to_sign {
        output.push_str("\nString to sign:\n");
        output.push_str(string_to_sign);
        output.push('\n');
    }

    output
}

fn format_vault_human(report: &VaultReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Vault: {}\n", report.path.display()));
    if !report.initialized {
        output.push_str("Status: not initialized\n");
        return output;
    }

    output.push_str("Status: initialized\n");
    if report.secrets.is_empty() {
        output.push_str("Stored keys: none\n");
    } else {
        output.push_str(&format!("Stored keys: {}\n", report.secrets.join(", ")));
    }
    output
}

/// Human-readable byte count
fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{} B", bytes)
    } else if value < KIB * KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{:.1} MiB", value / (KIB * KIB))
    }
}

/// Human-readable duration from milliseconds
fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

#[cfg(test)]
mod tests {
    include!("output/tests.rs");
}
