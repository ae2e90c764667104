// src/core/scanner/hsts_scanner.rs

use tracing::{debug, info, warn};

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

/// The part of the preload service's status document we read.
#[derive(Debug, Deserialize)]
struct PreloadStatus {
    status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HstsSignals {
    pub is_hsts_preloaded: bool,
}

impl Signals for HstsSignals {
    fn record(self, report: &mut ScanReport) {
        report.set_flag(Signal::IsHstsPreloaded, self.is_hsts_preloaded);
    }
}

/// Reads the service's JSON answer. Only an explicit `"preloaded"` status counts;
/// `"pending"`, `"unknown"` and anything else do not.
pub fn parse_preload_status(body: &str) -> ProbeResult<bool> {
    let parsed: PreloadStatus =
        serde_json::from_str(body).map_err(|e| ProbeError::Parse(format!("preload status: {e}")))?;
    debug!(status = %parsed.status, "Preload status parsed.");
    Ok(parsed.status.eq_ignore_ascii_case("preloaded"))
}

pub fn status_url(endpoint: &str, host: &str) -> ProbeResult<Url> {
    Url::parse_with_params(endpoint, &[("domain", host)])
        .map_err(|e| ProbeError::Parse(format!("preload endpoint {endpoint:?}: {e}")))
}

/// Asks the preload-status service about `host`. Attempted once, never retried.
pub async fn run_hsts_scan(
    endpoint: &str,
    host: &str,
    user_agent: &str,
    timeout: Duration,
    budget: &ProbeBudget,
) -> ProbeResult<HstsSignals> {
    info!(host, "Starting HSTS preload scan.");
    let url = status_url(endpoint, host)?;

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;

    let body = budget
        .run(Some(timeout), async {
            let response = client.get(url.clone()).send().await?.error_for_status()?;
            Ok::<_, ProbeError>(response.text().await?)
        })
        .await
        .inspect_err(|e| warn!(url = %url, error = %e, "Preload status request failed."))?;

    let is_hsts_preloaded = parse_preload_status(&body)
        .inspect_err(|e| warn!(error = %e, "Unreadable preload status response."))?;
    info!(is_hsts_preloaded, "HSTS preload scan finished.");
    Ok(HstsSignals { is_hsts_preloaded })
}
