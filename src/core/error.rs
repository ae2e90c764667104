// src/core/error.rs

use thiserror::Error;

/// Failures that stop a scan before any probe runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unresolvable host: {host}")]
    UnresolvableHost { host: String },
}

/// A single probe's failure. Never escapes the orchestrator: each one is
/// folded into the report as an absent or negative signal.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unacceptable status {0}")]
    Status(u16),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("DNS error: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),

    #[error("unexpected response: {0}")]
    Parse(String),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
