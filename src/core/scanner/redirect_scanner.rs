// src/core/scanner/redirect_scanner.rs

use tracing::{debug, info, warn};

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectSignals {
    pub has_http_redirect: bool,
}

impl Signals for RedirectSignals {
    fn record(self, report: &mut ScanReport) {
        report.set_flag(Signal::HasHttpRedirect, self.has_http_redirect);
    }
}

/// A 301..=308 answer whose target is an `https://` URL.
pub fn is_https_redirect(status: u16, location: Option<&str>) -> bool {
    (301..=308).contains(&status)
        && location.is_some_and(|target| {
            target
                .trim_start()
                .get(..8)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
        })
}

/// Sends one HEAD to the plain-HTTP form of the target without following redirects.
pub async fn run_redirect_scan(
    http_url: &Url,
    user_agent: &str,
    timeout: Duration,
    budget: &ProbeBudget,
) -> ProbeResult<RedirectSignals> {
    info!(url = %http_url, "Starting redirect scan.");

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(Policy::none())
        .build()?;

    let response = budget
        .run(Some(timeout), async {
            Ok::<_, ProbeError>(client.head(http_url.clone()).send().await?)
        })
        .await
        .inspect_err(|e| warn!(url = %http_url, error = %e, "HEAD request failed for redirect scan."))?;

    let status = response.status().as_u16();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok());
    debug!(status, location, "Received redirect response.");

    let signals = RedirectSignals { has_http_redirect: is_https_redirect(status, location) };
    info!(has_http_redirect = signals.has_http_redirect, "Redirect scan finished.");
    Ok(signals)
}
