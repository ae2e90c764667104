// src/main.rs

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vanguard_posture::core::rules::{CheckExplanation, explain};
use vanguard_posture::logging::initialize_logging;
use vanguard_posture::{ProbeConfig, ScanReport, Scanner, ScoreResult, score};

/// Vanguard Posture - website security posture scanner
#[derive(Parser, Debug)]
#[command(name = "vanguard-posture", version, about)]
struct Cli {
    /// Also log to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a website and print its report and score
    Scan {
        /// Absolute http:// or https:// URL of the site
        url: String,

        /// TOML file with probe settings
        #[arg(long, env = "VANGUARD_POSTURE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Score a previously saved report without touching the network
    Score {
        /// JSON report, either bare or as printed by `scan`
        report: PathBuf,
    },
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    report: &'a ScanReport,
    score: &'a ScoreResult,
    checks: Vec<CheckExplanation>,
}

impl<'a> ScanOutput<'a> {
    fn new(report: &'a ScanReport, score: &'a ScoreResult) -> Self {
        Self { report, score, checks: explain(score) }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- Setup ---
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = initialize_logging(cli.verbose)?;
    info!(log = %log_path.display(), "Logging initialized.");

    match cli.command {
        Command::Scan { url, config } => run_scan(&url, config.as_deref(), cli.pretty).await,
        Command::Score { report } => run_score(&report, cli.pretty),
    }
}

async fn run_scan(url: &str, config_path: Option<&Path>, pretty: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => ProbeConfig::from_file(path).wrap_err("could not load probe configuration")?,
        None => ProbeConfig::default(),
    }
    .merge_env();

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling scan.");
                cancel.cancel();
            }
        })
    };

    let scanner = Scanner::new(config);
    let report = scanner.scan_url(url, &cancel).await;
    ctrl_c.abort();

    let result = score(&report);
    info!(score = result.score, passed = result.passed_checks.len(), failed = result.failed_checks.len(), "Scan scored.");
    print_json(&ScanOutput::new(&report, &result), pretty)?;

    if let Some(error) = &report.error {
        bail!("scan of {url} failed: {error}");
    }
    if cancel.is_cancelled() {
        bail!("scan of {url} was interrupted, the report is incomplete");
    }
    Ok(())
}

fn run_score(path: &Path, pretty: bool) -> Result<()> {
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("could not read {}", path.display()))?;
    let report = parse_report(&content).wrap_err_with(|| format!("{} is not a scan report", path.display()))?;

    let result = score(&report);
    info!(score = result.score, "Saved report scored.");
    print_json(&ScanOutput::new(&report, &result), pretty)
}

/// Accepts either a bare report or the `{ "report": ..., "score": ... }`
/// document that `scan` prints.
fn parse_report(content: &str) -> serde_json::Result<ScanReport> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    match value.get("report") {
        Some(report) if value.get("score").is_some() => serde_json::from_value(report.clone()),
        _ => serde_json::from_value(value),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanguard_posture::Signal;

    #[test]
    fn cli_parses_both_commands() {
        let cli = Cli::try_parse_from(["vanguard-posture", "scan", "https://example.com", "--pretty"]).unwrap();
        assert!(cli.pretty);
        assert!(matches!(cli.command, Command::Scan { ref url, config: None } if url == "https://example.com"));

        let cli = Cli::try_parse_from(["vanguard-posture", "-v", "score", "report.json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Score { .. }));
    }

    #[test]
    fn scan_requires_a_url() {
        assert!(Cli::try_parse_from(["vanguard-posture", "scan"]).is_err());
    }

    #[test]
    fn saved_reports_parse_bare_or_wrapped() {
        let bare = parse_report(r#"{"https":true,"dns_a_record":true}"#).unwrap();
        assert_eq!(bare.flag(Signal::Https), Some(true));

        let wrapped = parse_report(
            r#"{"report":{"https":false},"score":{"score":0,"passed_checks":[],"failed_checks":["https"]}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.flag(Signal::Https), Some(false));
    }

    #[test]
    fn stored_rows_with_extra_columns_and_nulls_parse() {
        let report = parse_report(r#"{"id":4,"https":true,"tls_version":null,"created_at":"2025-08-18"}"#).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.flag(Signal::Https), Some(true));
    }

    #[test]
    fn output_explains_each_counted_check() {
        let report = parse_report(r#"{"https":true,"has_x_frame_options":false}"#).unwrap();
        let result = score(&report);
        let json = serde_json::to_value(ScanOutput::new(&report, &result)).unwrap();

        let checks = json["checks"].as_array().unwrap();
        assert_eq!(checks.len(), result.denominator());
        assert_eq!(checks[0]["key"], "https");
        assert_eq!(checks[0]["passed"], true);
        assert_eq!(checks[0]["title"], "HTTPS available");
        assert!(checks.iter().any(|c| c["key"] == "has_x_frame_options" && c["passed"] == false));
    }

    #[test]
    fn non_json_input_is_rejected() {
        assert!(parse_report("https=true").is_err());
    }
}
