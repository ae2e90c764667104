// src/core/models.rs

use chrono::NaiveDate;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, warn};
use url::Url;

// --- Target ---

/// A validated scan target. Only the validator constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    url: Url,
    host: String,
}

impl ScanTarget {
    pub(crate) fn new(url: Url, host: String) -> Self {
        Self { url, host }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The scheme the caller supplied, `http` or `https`.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The `https://` form of the target, used by the reachability and content probes.
    pub fn https_url(&self) -> Url {
        let mut url = self.url.clone();
        if url.scheme() != "https" {
            // Both schemes are "special", so the switch cannot fail.
            let _ = url.set_scheme("https");
            let _ = url.set_port(None);
        }
        url
    }

    /// The `http://` form of the target, used by the redirect probe.
    pub fn http_url(&self) -> Url {
        let mut url = self.url.clone();
        if url.scheme() != "http" {
            let _ = url.set_scheme("http");
            let _ = url.set_port(None);
        }
        url
    }

    /// Normalized website identity: lowercase, no scheme, no leading `www.`,
    /// no trailing slash. Results for `https://www.Example.com/` and
    /// `http://example.com` share the slug `example.com`.
    pub fn slug(&self) -> String {
        normalize_slug(self.url.as_str())
    }
}

pub(crate) fn normalize_slug(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    without_www.trim_end_matches('/').to_string()
}

// --- Signals ---

/// Every signal a probe can report. Serialized in snake_case, which is the
/// key used in the flat report mapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, AsRefStr, IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    // Reachability
    Https,
    SpeedMs,
    EffectiveUrl,
    WebsitePrefix,
    // TLS
    TlsVersion,
    TlsCipher,
    IsTlsOutdated,
    SslExpiryDate,
    SslDaysRemaining,
    IsSslExpiringSoon,
    HasWeakCiphers,
    // Headers
    ServerHeader,
    HasServerVersionExposed,
    HasCsp,
    IsCspWeak,
    HasXFrameOptions,
    HasHsts,
    HasXContentTypeOptions,
    HasPermissiveCors,
    HasSecureCookies,
    HasHttponlyCookies,
    HasSamesiteCookies,
    // Content
    HasMixedContent,
    HasSri,
    // Redirect / HSTS preload
    HasHttpRedirect,
    IsHstsPreloaded,
    // DNS
    DnsARecord,
    DnsAaaaRecord,
    DnsCaaRecord,
    DnsSpf,
    DnsDkim,
    DnsDmarc,
    IsDmarcStrong,
}

/// The declared value type of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Flag,
    Text,
    Date,
    Integer,
}

impl Signal {
    pub fn kind(self) -> SignalKind {
        match self {
            Signal::EffectiveUrl
            | Signal::WebsitePrefix
            | Signal::TlsVersion
            | Signal::TlsCipher
            | Signal::ServerHeader => SignalKind::Text,
            Signal::SslExpiryDate => SignalKind::Date,
            Signal::SpeedMs | Signal::SslDaysRemaining => SignalKind::Integer,
            _ => SignalKind::Flag,
        }
    }
}

/// A determined signal value. "Not determined" is never a value: it is the
/// absence of the key from the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Flag(bool),
    Integer(i64),
    Date(NaiveDate),
    Text(String),
}

impl SignalValue {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalValue::Flag(_) => SignalKind::Flag,
            SignalValue::Integer(_) => SignalKind::Integer,
            SignalValue::Date(_) => SignalKind::Date,
            SignalValue::Text(_) => SignalKind::Text,
        }
    }
}

// --- Report ---

/// The flat signal-name → value mapping produced by one scan.
///
/// `error` is only set when validation failed, in which case no probe ran
/// and `signals` is empty.
///
/// Deserialization is lenient so that stored rows can be rescored: a `null`
/// value reads as an absent signal, and keys that name no signal are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawReport")]
pub struct ScanReport {
    #[serde(flatten)]
    signals: BTreeMap<Signal, SignalValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The report handed back when validation fails: no signals, tagged error.
    pub fn failed(error: impl ToString) -> Self {
        Self {
            signals: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn set_flag(&mut self, signal: Signal, value: bool) {
        self.insert(signal, SignalValue::Flag(value));
    }

    pub fn set_text(&mut self, signal: Signal, value: impl Into<String>) {
        self.insert(signal, SignalValue::Text(value.into()));
    }

    pub fn set_date(&mut self, signal: Signal, value: NaiveDate) {
        self.insert(signal, SignalValue::Date(value));
    }

    pub fn set_integer(&mut self, signal: Signal, value: i64) {
        self.insert(signal, SignalValue::Integer(value));
    }

    fn insert(&mut self, signal: Signal, value: SignalValue) {
        debug_assert_eq!(signal.kind(), value.kind(), "{signal} written with the wrong type");
        self.signals.insert(signal, value);
    }

    pub fn get(&self, signal: Signal) -> Option<&SignalValue> {
        self.signals.get(&signal)
    }

    pub fn flag(&self, signal: Signal) -> Option<bool> {
        match self.signals.get(&signal) {
            Some(SignalValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.signals.contains_key(&signal)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, &SignalValue)> {
        self.signals.iter().map(|(signal, value)| (*signal, value))
    }

    /// True when every present value matches its signal's declared type.
    /// Reports built by the scanner always are; deserialized ones may not be.
    pub fn is_well_typed(&self) -> bool {
        self.signals.iter().all(|(signal, value)| signal.kind() == value.kind())
    }
}

/// A stored value before it is matched to a signal. Anything that is not a
/// `SignalValue` (`null`, arrays, objects) lands in `Other`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Value(SignalValue),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
struct RawReport {
    #[serde(flatten)]
    entries: BTreeMap<String, RawValue>,
    #[serde(default)]
    error: Option<String>,
}

impl From<RawReport> for ScanReport {
    fn from(raw: RawReport) -> Self {
        let mut signals = BTreeMap::new();
        for (key, value) in raw.entries {
            match (Signal::from_str(&key), value) {
                (Ok(signal), RawValue::Value(value)) => {
                    signals.insert(signal, value);
                }
                (Ok(signal), RawValue::Other(_)) => {
                    debug!(%signal, "Signal stored without a value, reading it as not determined.");
                }
                (Err(_), _) => warn!(key = %key, "Ignoring key that names no signal."),
            }
        }
        Self { signals, error: raw.error }
    }
}

impl FromIterator<(Signal, SignalValue)> for ScanReport {
    fn from_iter<I: IntoIterator<Item = (Signal, SignalValue)>>(iter: I) -> Self {
        Self {
            signals: iter.into_iter().collect(),
            error: None,
        }
    }
}

// --- Scoring ---

/// One row of the scoring table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRule {
    pub key: Signal,
    /// The value that counts as passing. `false` for "bad thing detected" signals.
    pub pass_value: bool,
    /// When set, an absent signal is counted as a failure instead of skipped.
    pub always_counted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u8,
    pub passed_checks: Vec<Signal>,
    pub failed_checks: Vec<Signal>,
}

impl ScoreResult {
    /// Number of rules that took part in the score.
    pub fn denominator(&self) -> usize {
        self.passed_checks.len() + self.failed_checks.len()
    }
}
