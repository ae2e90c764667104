// src/core/scanner/mod.rs

// Each probe lives in its own module and returns its findings as a value.
// This module runs them concurrently and folds their outcomes into one report.
pub mod content_scanner;
pub mod dns_scanner;
pub mod headers_scanner;
pub mod hsts_scanner;
pub mod reachability;
pub mod redirect_scanner;
pub mod ssl_scanner;

use tracing::{Instrument, info, info_span, warn};

use hickory_resolver::TokioAsyncResolver;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ProbeConfig;
use crate::core::error::{ProbeError, ProbeResult, ScanError};
use crate::core::models::{ScanReport, ScanTarget, Signal};
use crate::core::validator;

use self::content_scanner::{ContentSignals, run_content_scan};
use self::dns_scanner::{DnsSignals, build_resolver, run_dns_scan};
use self::headers_scanner::{HeaderSignals, run_headers_scan};
use self::hsts_scanner::{HstsSignals, run_hsts_scan};
use self::reachability::{Reachability, ReachabilityState, ReqwestTransport, probe_reachability};
use self::redirect_scanner::{RedirectSignals, run_redirect_scan};
use self::ssl_scanner::{TlsSignals, run_ssl_scan};

/// A probe's findings, ready to be written into a report.
pub trait Signals {
    fn record(self, report: &mut ScanReport);
}

// --- Budget ---

/// Shared limits for every network call in one scan: the caller's
/// cancellation token and the scan-wide deadline.
#[derive(Debug, Clone)]
pub struct ProbeBudget {
    cancel: CancellationToken,
    deadline: Instant,
}

impl ProbeBudget {
    pub fn new(cancel: CancellationToken, ceiling: Duration) -> Self {
        let now = Instant::now();
        // An absurd ceiling from config must not overflow the clock.
        let deadline = now
            .checked_add(ceiling)
            .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)));
        Self { cancel, deadline }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Runs `fut` until it finishes, `timeout` elapses, the scan deadline
    /// passes, or the scan is cancelled, whichever comes first.
    ///
    /// `fut` is never polled once the budget is already exhausted.
    pub async fn run<T, F>(&self, timeout: Option<Duration>, fut: F) -> ProbeResult<T>
    where
        F: Future<Output = ProbeResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ProbeError::Timeout);
        }

        let deadline = timeout
            .and_then(|t| Instant::now().checked_add(t))
            .map_or(self.deadline, |probe_deadline| probe_deadline.min(self.deadline));

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
            result = tokio::time::timeout_at(deadline, fut) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ProbeError::Timeout),
            },
        }
    }

    /// Sleeps for `delay` unless the scan is cancelled first. A pause that
    /// would outlast the scan deadline fails straight away.
    pub async fn pause(&self, delay: Duration) -> ProbeResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        let wake = match Instant::now().checked_add(delay) {
            Some(wake) if wake <= self.deadline => wake,
            _ => return Err(ProbeError::Timeout),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
            _ = tokio::time::sleep_until(wake) => Ok(()),
        }
    }
}

// --- Merging ---

/// Writes a probe's outcome into the report. A failed probe writes its
/// `fallback` when it has one and nothing otherwise.
fn merge<S: Signals>(report: &mut ScanReport, probe: &'static str, outcome: ProbeResult<S>, fallback: Option<S>) {
    match outcome {
        Ok(signals) => signals.record(report),
        Err(e) => {
            warn!(probe, error = %e, fallback = fallback.is_some(), "Probe failed, signals not determined.");
            if let Some(signals) = fallback {
                signals.record(report);
            }
        }
    }
}

/// Outcomes of the probes gated on HTTPS reachability.
struct TransportOutcome {
    reachability: Reachability,
    /// Present only when the target was reachable.
    gated: Option<(ProbeResult<TlsSignals>, ProbeResult<ContentSignals>)>,
}

/// Outcomes of the header probe and the preload lookup that depends on it.
struct HeaderOutcome {
    headers: ProbeResult<HeaderSignals>,
    /// Present only when the response carried a Strict-Transport-Security header.
    preload: Option<ProbeResult<HstsSignals>>,
}

/// Where the TLS and content probes should look, if they should run at all:
/// only after HTTPS succeeded, and at the URL the redirects ended on.
fn gated_url(reachability: &Reachability) -> Option<&Url> {
    if reachability.https() { reachability.effective_url.as_ref() } else { None }
}

/// The preload lookup only makes sense for a site that sends HSTS.
fn needs_preload_lookup(headers: &ProbeResult<HeaderSignals>) -> bool {
    matches!(headers, Ok(signals) if signals.has_hsts)
}

/// Folds every branch's outcome into one report, in a fixed order.
///
/// Skipped probes write nothing. Failed probes write nothing, except the
/// redirect and preload lookups, whose failure reads as `false`.
fn assemble(
    scheme: &str,
    transport: TransportOutcome,
    headers: HeaderOutcome,
    redirect: ProbeResult<RedirectSignals>,
    dns: DnsSignals,
) -> ScanReport {
    let mut report = ScanReport::new();
    report.set_text(Signal::WebsitePrefix, scheme);

    transport.reachability.record(&mut report);
    if let Some((tls, content)) = transport.gated {
        merge(&mut report, "tls", tls, None);
        merge(&mut report, "content", content, None);
    }

    merge(&mut report, "headers", headers.headers, None);
    if let Some(preload) = headers.preload {
        merge(&mut report, "hsts_preload", preload, Some(HstsSignals { is_hsts_preloaded: false }));
    }

    merge(&mut report, "redirect", redirect, Some(RedirectSignals { has_http_redirect: false }));
    dns.record(&mut report);
    report
}

// --- Orchestrator ---

/// Runs every probe against a target and assembles the report.
pub struct Scanner {
    config: ProbeConfig,
    resolver: TokioAsyncResolver,
}

impl Scanner {
    pub fn new(config: ProbeConfig) -> Self {
        let resolver = build_resolver(config.timeouts.dns());
        Self { config, resolver }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Checks the caller's input and confirms the host exists.
    pub async fn validate(&self, input: &str) -> Result<ScanTarget, ScanError> {
        validator::validate(input, &self.resolver, self.config.timeouts.dns()).await
    }

    /// Validates `input`, then scans it. A validation failure yields a report
    /// carrying only the error, and no probe is started.
    pub async fn scan_url(&self, input: &str, cancel: &CancellationToken) -> ScanReport {
        match self.validate(input).await {
            Ok(target) => self.scan(&target, cancel).await,
            Err(e) => ScanReport::failed(e),
        }
    }

    /// Scans a validated target. Never fails: each probe that cannot finish
    /// leaves its signals absent or negative.
    pub async fn scan(&self, target: &ScanTarget, cancel: &CancellationToken) -> ScanReport {
        let budget = ProbeBudget::new(cancel.clone(), self.config.scan_deadline());
        let host = target.host();
        let http_url = target.http_url();
        let started = Instant::now();
        info!(url = %target.url(), host, "Starting full scan.");

        let (transport, headers, redirect, dns) = tokio::join!(
            self.run_transport_probes(target, &budget),
            self.run_header_probes(target, &budget),
            run_redirect_scan(&http_url, &self.config.user_agent, self.config.timeouts.redirect(), &budget)
                .instrument(info_span!("probe", probe = "redirect", host)),
            run_dns_scan(&self.resolver, host, &budget).instrument(info_span!("probe", probe = "dns", host)),
        );

        let report = assemble(target.scheme(), transport, headers, redirect, dns);

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(host, signals = report.len(), elapsed_ms, cancelled = cancel.is_cancelled(), "Full scan finished.");
        report
    }

    /// Reachability first; the TLS and content probes only run once the
    /// target answered over HTTPS.
    async fn run_transport_probes(&self, target: &ScanTarget, budget: &ProbeBudget) -> TransportOutcome {
        let host = target.host();
        let reachability = self
            .probe_https(target, budget)
            .instrument(info_span!("probe", probe = "reachability", host))
            .await;

        let gated = match gated_url(&reachability) {
            Some(effective_url) => {
                let timeouts = &self.config.timeouts;
                Some(tokio::join!(
                    run_ssl_scan(host, timeouts.tls(), budget).instrument(info_span!("probe", probe = "tls", host)),
                    run_content_scan(effective_url, host, &self.config.user_agent, timeouts.content(), budget)
                        .instrument(info_span!("probe", probe = "content", host)),
                ))
            }
            None => {
                info!(host, "HTTPS unreachable, skipping TLS and content probes.");
                None
            }
        };

        TransportOutcome { reachability, gated }
    }

    async fn probe_https(&self, target: &ScanTarget, budget: &ProbeBudget) -> Reachability {
        let config = &self.config.reachability;
        match ReqwestTransport::new(&self.config.user_agent, config.timeout()) {
            Ok(transport) => probe_reachability(&transport, &target.https_url(), config, budget).await,
            Err(e) => {
                warn!(error = %e, "Failed to build HTTPS client for reachability probe.");
                Reachability {
                    state: ReachabilityState::Failed,
                    attempts: 0,
                    speed_ms: 0,
                    effective_url: None,
                }
            }
        }
    }

    /// Headers first; the preload lookup only runs when HSTS is advertised.
    async fn run_header_probes(&self, target: &ScanTarget, budget: &ProbeBudget) -> HeaderOutcome {
        let host = target.host();
        let timeouts = &self.config.timeouts;
        let headers = run_headers_scan(target.url(), &self.config.user_agent, timeouts.headers(), budget)
            .instrument(info_span!("probe", probe = "headers", host))
            .await;

        let preload = if needs_preload_lookup(&headers) {
            Some(
                run_hsts_scan(
                    &self.config.hsts_preload.endpoint,
                    host,
                    &self.config.user_agent,
                    timeouts.hsts_preload(),
                    budget,
                )
                .instrument(info_span!("probe", probe = "hsts_preload", host))
                .await,
            )
        } else {
            None
        };

        HeaderOutcome { headers, preload }
    }
}
