// src/core/validator.rs

use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::{debug, error, info};
use url::{Host, Url};

use crate::core::error::ScanError;
use crate::core::models::ScanTarget;

/// How a validated host will be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedHost {
    Domain(String),
    Ip(String),
}

/// Checks the shape of the caller's input without touching the network.
///
/// Requires an absolute `http://` or `https://` URL whose host is an IP
/// literal or a dotted domain name.
pub fn parse_target(input: &str) -> Result<(Url, ParsedHost), ScanError> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ScanError::InvalidInput(format!("'{trimmed}' is not an absolute URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScanError::InvalidInput(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if domain.contains('.') && !domain.starts_with('.') => {
            ParsedHost::Domain(domain.trim_end_matches('.').to_string())
        }
        Some(Host::Domain(domain)) => {
            return Err(ScanError::InvalidInput(format!("'{domain}' is not a fully qualified domain")));
        }
        Some(Host::Ipv4(addr)) => ParsedHost::Ip(addr.to_string()),
        Some(Host::Ipv6(addr)) => ParsedHost::Ip(addr.to_string()),
        None => return Err(ScanError::InvalidInput(format!("'{trimmed}' has no host"))),
    };

    Ok((url, host))
}

/// Validates `input` and confirms its host has an A record.
///
/// This is a single cheap lookup, not the DNS probe: it only keeps obviously
/// dead targets from consuming a full scan.
pub async fn validate(
    input: &str,
    resolver: &TokioAsyncResolver,
    lookup_timeout: Duration,
) -> Result<ScanTarget, ScanError> {
    let (url, host) = parse_target(input).inspect_err(|e| error!(input, error = %e, "Rejected scan input."))?;

    let host = match host {
        ParsedHost::Ip(addr) => {
            debug!(host = %addr, "IP literal target, skipping existence lookup.");
            addr
        }
        ParsedHost::Domain(domain) => {
            match tokio::time::timeout(lookup_timeout, resolver.ipv4_lookup(domain.as_str())).await {
                Ok(Ok(lookup)) if lookup.iter().next().is_some() => {
                    debug!(host = %domain, "Host resolves.");
                }
                Ok(Ok(_)) => {
                    error!(host = %domain, "Host has no A record.");
                    return Err(ScanError::UnresolvableHost { host: domain });
                }
                Ok(Err(e)) => {
                    error!(host = %domain, error = %e, "Host lookup failed.");
                    return Err(ScanError::UnresolvableHost { host: domain });
                }
                Err(_) => {
                    error!(host = %domain, "Host lookup timed out.");
                    return Err(ScanError::UnresolvableHost { host: domain });
                }
            }
            domain
        }
    };

    info!(url = %url, host = %host, "Target validated.");
    Ok(ScanTarget::new(url, host))
}
