// src/core/scanner/ssl_scanner.rs

use tracing::{debug, error, info, warn};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ProtocolVersion, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

/// Substrings that mark a cipher suite as weak, matched case-insensitively.
const WEAK_CIPHER_MARKERS: &[&str] = &["rc4", "des", "3des", "md5"];

/// Days of validity left at or below which a certificate is "expiring soon".
const EXPIRY_WARNING_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86_400;

static TLS_CONFIG: Lazy<Result<Arc<ClientConfig>, rustls::Error>> = Lazy::new(|| {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
});

/// Everything the TLS probe learned. Only produced when the handshake and
/// certificate parse both succeeded; otherwise the probe fails and none of
/// these signals are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSignals {
    pub tls_version: String,
    pub is_tls_outdated: bool,
    pub cipher: String,
    pub has_weak_ciphers: bool,
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
    pub is_expiring_soon: bool,
}

impl Signals for TlsSignals {
    fn record(self, report: &mut ScanReport) {
        report.set_text(Signal::TlsVersion, self.tls_version);
        report.set_flag(Signal::IsTlsOutdated, self.is_tls_outdated);
        report.set_text(Signal::TlsCipher, self.cipher);
        report.set_flag(Signal::HasWeakCiphers, self.has_weak_ciphers);
        report.set_date(Signal::SslExpiryDate, self.expiry_date);
        report.set_integer(Signal::SslDaysRemaining, self.days_remaining);
        report.set_flag(Signal::IsSslExpiringSoon, self.is_expiring_soon);
    }
}

/// Maps the negotiated protocol to its display name and whether it is outdated.
pub fn describe_protocol(version: ProtocolVersion) -> (String, bool) {
    match version {
        ProtocolVersion::TLSv1_3 => ("TLS 1.3".to_string(), false),
        ProtocolVersion::TLSv1_2 => ("TLS 1.2".to_string(), false),
        ProtocolVersion::TLSv1_1 => ("TLS 1.1".to_string(), true),
        ProtocolVersion::TLSv1_0 => ("TLS 1.0".to_string(), true),
        ProtocolVersion::SSLv3 => ("SSL 3.0".to_string(), true),
        ProtocolVersion::SSLv2 => ("SSL 2.0".to_string(), true),
        other => (format!("{other:?}"), false),
    }
}

pub fn is_weak_cipher(cipher: &str) -> bool {
    let lowered = cipher.to_ascii_lowercase();
    WEAK_CIPHER_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Expiry date, whole days left (truncated) and the expiring-soon flag.
///
/// The flag compares exact seconds, so 30 days and 20 hours is not "soon"
/// even though it truncates to 30 whole days. An already expired
/// certificate has negative days and is expiring soon.
pub fn expiry_signals(not_after: DateTime<Utc>, now: DateTime<Utc>) -> (NaiveDate, i64, bool) {
    let seconds_remaining = (not_after - now).num_seconds();
    let days_remaining = seconds_remaining / SECONDS_PER_DAY;
    let is_expiring_soon = seconds_remaining <= EXPIRY_WARNING_DAYS * SECONDS_PER_DAY;
    (not_after.date_naive(), days_remaining, is_expiring_soon)
}

/// Opens a TLS connection to `host:443` and inspects what was negotiated.
pub async fn run_ssl_scan(host: &str, timeout: Duration, budget: &ProbeBudget) -> ProbeResult<TlsSignals> {
    info!(host, "Starting SSL/TLS scan.");
    let signals = budget.run(Some(timeout), perform_tls_scan(host)).await?;
    info!(version = %signals.tls_version, cipher = %signals.cipher, days_remaining = signals.days_remaining, "SSL/TLS scan finished.");
    Ok(signals)
}

async fn perform_tls_scan(host: &str) -> ProbeResult<TlsSignals> {
    let config = TLS_CONFIG.as_ref().map_err(|e| {
        error!(error = %e, "Failed to build TLS client configuration");
        ProbeError::Tls(e.to_string())
    })?;
    let server_name = ServerName::try_from(host.to_string()).map_err(|e| ProbeError::Tls(format!("invalid server name: {e}")))?;

    debug!(host, "Connecting TCP stream to port 443.");
    let stream = TcpStream::connect((host, 443)).await.inspect_err(|e| {
        warn!(error = %e, "TCP connection failed");
    })?;

    debug!(host, "Performing TLS handshake.");
    let stream = TlsConnector::from(Arc::clone(config))
        .connect(server_name, stream)
        .await
        .map_err(|e| {
            warn!(error = %e, "TLS handshake failed");
            ProbeError::Tls(e.to_string())
        })?;

    let (_, connection) = stream.get_ref();

    let protocol = connection
        .protocol_version()
        .ok_or_else(|| ProbeError::Tls("no protocol version negotiated".into()))?;
    let (tls_version, is_tls_outdated) = describe_protocol(protocol);

    let cipher = connection
        .negotiated_cipher_suite()
        .map(|suite| format!("{:?}", suite.suite()))
        .ok_or_else(|| ProbeError::Tls("no cipher suite negotiated".into()))?;
    let has_weak_ciphers = is_weak_cipher(&cipher);
    debug!(%tls_version, %cipher, "Handshake parameters captured.");

    let leaf = connection
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| ProbeError::Certificate("server did not provide a certificate".into()))?;

    let (_, x509) = parse_x509_certificate(leaf.as_ref()).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        ProbeError::Certificate(format!("X.509 parse error: {e}"))
    })?;
    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let not_after = asn1_time_to_chrono_utc(&x509.validity().not_after)?;
    let (expiry_date, days_remaining, is_expiring_soon) = expiry_signals(not_after, Utc::now());

    Ok(TlsSignals {
        tls_version,
        is_tls_outdated,
        cipher,
        has_weak_ciphers,
        expiry_date,
        days_remaining,
        is_expiring_soon,
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> ProbeResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| ProbeError::Certificate("certificate expiry out of range".into()))
}
