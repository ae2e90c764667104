// src/core/scanner/reachability.rs

use tracing::{debug, info, warn};

use reqwest::redirect::Policy;
use std::future::Future;
use std::time::{Duration, Instant};
use strum::Display;
use url::Url;

use crate::config::ReachabilityConfig;
use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

/// What came back from one HTTPS attempt that completed with a verified certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpsResponse {
    pub status: u16,
    /// Where the request ended up after following redirects.
    pub final_url: Url,
}

/// One HTTPS round trip. An `Ok` means the connection completed and the
/// certificate chain verified; the status is judged by the caller.
pub trait HttpsTransport {
    fn fetch(&self, url: &Url) -> impl Future<Output = ProbeResult<HttpsResponse>> + Send;
}

/// The production transport: a verifying, redirect-following reqwest client.
///
/// It verifies with rustls against the webpki roots, the same trust store the
/// TLS inspector uses, so a site reachable here can also be inspected there.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpsTransport for ReqwestTransport {
    async fn fetch(&self, url: &Url) -> ProbeResult<HttpsResponse> {
        let response = self.client.get(url.clone()).send().await?;
        Ok(HttpsResponse {
            status: response.status().as_u16(),
            final_url: response.url().clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReachabilityState {
    Attempting,
    Retrying,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    /// Terminal state, `Succeeded` or `Failed`.
    pub state: ReachabilityState,
    pub attempts: u32,
    /// Wall-clock time of the attempt that decided the state.
    pub speed_ms: u64,
    pub effective_url: Option<Url>,
}

impl Reachability {
    pub fn https(&self) -> bool {
        self.state == ReachabilityState::Succeeded
    }
}

impl Signals for Reachability {
    fn record(self, report: &mut ScanReport) {
        report.set_flag(Signal::Https, self.https());
        report.set_integer(Signal::SpeedMs, i64::try_from(self.speed_ms).unwrap_or(i64::MAX));
        if let Some(url) = self.effective_url {
            report.set_text(Signal::EffectiveUrl, url.as_str());
        }
    }
}

/// Tries `url` over HTTPS until it answers acceptably or the retry budget runs out.
///
/// Acceptable means the transport succeeded and the status is in 200..400 or
/// listed in `extra_reachable_statuses`. Any other outcome is retried after a
/// fixed delay. Running out of attempts is a normal result, not an error.
pub async fn probe_reachability<T: HttpsTransport>(
    transport: &T,
    url: &Url,
    config: &ReachabilityConfig,
    budget: &ProbeBudget,
) -> Reachability {
    let max_attempts = config.retries.saturating_add(1);
    let mut attempt = 0;

    info!(url = %url, max_attempts, "Starting reachability probe.");
    loop {
        attempt += 1;
        debug!(attempt, state = %ReachabilityState::Attempting, "Sending HTTPS request.");

        let started = Instant::now();
        let result = budget.run(Some(config.timeout()), transport.fetch(url)).await;
        let speed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let error = match result {
            Ok(response) if config.is_reachable_status(response.status) => {
                info!(attempt, status = response.status, speed_ms, final_url = %response.final_url, state = %ReachabilityState::Succeeded, "Target reachable over HTTPS.");
                return Reachability {
                    state: ReachabilityState::Succeeded,
                    attempts: attempt,
                    speed_ms,
                    effective_url: Some(response.final_url),
                };
            }
            Ok(response) => ProbeError::Status(response.status),
            Err(e) => e,
        };

        let failed = Reachability {
            state: ReachabilityState::Failed,
            attempts: attempt,
            speed_ms,
            effective_url: None,
        };

        if attempt >= max_attempts || matches!(error, ProbeError::Cancelled) {
            warn!(attempt, error = %error, state = %ReachabilityState::Failed, "Target not reachable over HTTPS.");
            return failed;
        }

        warn!(attempt, error = %error, state = %ReachabilityState::Retrying, "HTTPS attempt failed, retrying.");
        if let Err(e) = budget.pause(config.retry_delay()).await {
            warn!(attempt, error = %e, state = %ReachabilityState::Failed, "Scan budget exhausted while waiting to retry.");
            return failed;
        }
    }
}
