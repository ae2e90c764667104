// src/core/scanner/dns_scanner.rs

use tracing::{debug, info, warn};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

/// Common DKIM selectors checked when the real one is unknown.
const COMMON_DKIM_SELECTORS: &[&str] = &["google", "selector1", "selector2", "default", "dkim"];

/// Builds the resolver shared by the validator and the DNS probe.
///
/// One attempt per query: a failing resolver is reported, not hammered.
pub fn build_resolver(query_timeout: Duration) -> TokioAsyncResolver {
    let mut opts = ResolverOpts::default();
    opts.timeout = query_timeout;
    opts.attempts = 1;
    TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
}

/// DNS findings. Every field is determined: a failed lookup is a negative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsSignals {
    pub a_record: bool,
    pub aaaa_record: bool,
    pub caa_record: bool,
    pub mail: MailAuthSignals,
}

/// What the TXT records say about mail authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailAuthSignals {
    pub spf: bool,
    pub dkim: bool,
    pub dmarc: bool,
    pub dmarc_strong: bool,
}

impl Signals for DnsSignals {
    fn record(self, report: &mut ScanReport) {
        report.set_flag(Signal::DnsARecord, self.a_record);
        report.set_flag(Signal::DnsAaaaRecord, self.aaaa_record);
        report.set_flag(Signal::DnsCaaRecord, self.caa_record);
        report.set_flag(Signal::DnsSpf, self.mail.spf);
        report.set_flag(Signal::DnsDkim, self.mail.dkim);
        report.set_flag(Signal::DnsDmarc, self.mail.dmarc);
        report.set_flag(Signal::IsDmarcStrong, self.mail.dmarc_strong);
    }
}

/// Scans TXT records case-insensitively for SPF, DKIM and DMARC markers.
/// A DMARC record is strong when it asks receivers to reject or quarantine.
pub fn classify_txt_records<S: AsRef<str>>(records: &[S]) -> MailAuthSignals {
    let mut signals = MailAuthSignals::default();
    for record in records {
        let lowered = record.as_ref().to_ascii_lowercase();
        if lowered.contains("v=spf1") {
            signals.spf = true;
        }
        if lowered.contains("dkim") {
            signals.dkim = true;
        }
        if lowered.contains("v=dmarc1") {
            signals.dmarc = true;
            if lowered.contains("p=reject") || lowered.contains("p=quarantine") {
                signals.dmarc_strong = true;
            }
        }
    }
    signals
}

/// Runs every DNS lookup for `host` concurrently.
///
/// Each lookup is independent; one that fails is logged and read as "record
/// not present". The probe itself therefore never fails.
pub async fn run_dns_scan(resolver: &TokioAsyncResolver, host: &str, budget: &ProbeBudget) -> DnsSignals {
    // Mail records live on the registrable name, not on the www. alias.
    let mail_domain = host.strip_prefix("www.").unwrap_or(host);
    info!(host, mail_domain, "Starting DNS scan.");

    let (a_record, aaaa_record, caa_record, txt_records) = tokio::join!(
        lookup_present(resolver, host, RecordType::A, budget),
        lookup_present(resolver, host, RecordType::AAAA, budget),
        lookup_present(resolver, host, RecordType::CAA, budget),
        collect_txt_records(resolver, host, mail_domain, budget),
    );

    let mail = classify_txt_records(txt_records.as_slice());
    debug!(txt_records = txt_records.len(), ?mail, "TXT records classified.");

    let signals = DnsSignals { a_record, aaaa_record, caa_record, mail };
    info!(?signals, "DNS scan finished.");
    signals
}

async fn lookup_present(resolver: &TokioAsyncResolver, host: &str, record_type: RecordType, budget: &ProbeBudget) -> bool {
    debug!(host, %record_type, "Looking up record.");
    let result = budget
        .run(None, async {
            resolver.lookup(host, record_type).await.map_err(ProbeError::from)
        })
        .await;
    match result {
        Ok(lookup) => {
            let found = lookup.record_iter().any(|r| r.record_type() == record_type);
            debug!(host, %record_type, found, "Lookup finished.");
            found
        }
        Err(e) => {
            warn!(host, %record_type, error = %e, "Lookup failed.");
            false
        }
    }
}

/// TXT records from the host, `_dmarc.` and the common DKIM selectors, flattened.
async fn collect_txt_records(resolver: &TokioAsyncResolver, host: &str, mail_domain: &str, budget: &ProbeBudget) -> Vec<String> {
    let mut names = vec![host.to_string(), format!("_dmarc.{mail_domain}")];
    if mail_domain != host {
        names.push(mail_domain.to_string());
    }
    names.extend(COMMON_DKIM_SELECTORS.iter().map(|selector| format!("{selector}._domainkey.{mail_domain}")));

    let mut lookups = JoinSet::new();
    for name in names {
        let resolver = resolver.clone();
        let budget = budget.clone();
        lookups.spawn(async move {
            let result = lookup_txt(&resolver, &name, &budget).await;
            (name, result)
        });
    }

    let mut records = Vec::new();
    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok((_, Ok(found))) => records.extend(found),
            Ok((name, Err(e))) => debug!(name = %name, error = %e, "TXT lookup returned nothing."),
            Err(e) => warn!(error = %e, "TXT lookup task panicked."),
        }
    }
    records
}

async fn lookup_txt(resolver: &TokioAsyncResolver, name: &str, budget: &ProbeBudget) -> ProbeResult<Vec<String>> {
    let lookup = budget
        .run(None, async { resolver.txt_lookup(name).await.map_err(ProbeError::from) })
        .await?;
    Ok(lookup.iter().map(|txt| txt.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spf_is_detected_case_insensitively() {
        let signals = classify_txt_records(&["V=SPF1 include:_spf.google.com ~all"]);
        assert!(signals.spf);
        assert!(!signals.dkim);
        assert!(!signals.dmarc);
    }

    #[test]
    fn dkim_marker_anywhere_in_a_record() {
        let signals = classify_txt_records(&["v=DKIM1; k=rsa; p=MIIBIjANBgkq"]);
        assert!(signals.dkim);
    }

    #[test]
    fn dmarc_strength_follows_its_policy() {
        let strong = classify_txt_records(&["v=DMARC1; p=reject; rua=mailto:d@example.com"]);
        assert!(strong.dmarc && strong.dmarc_strong);

        let quarantine = classify_txt_records(&["v=dmarc1; p=quarantine"]);
        assert!(quarantine.dmarc && quarantine.dmarc_strong);

        let monitoring = classify_txt_records(&["v=DMARC1; p=none"]);
        assert!(monitoring.dmarc);
        assert!(!monitoring.dmarc_strong);
    }

    #[test]
    fn strength_requires_the_policy_in_the_dmarc_record_itself() {
        let signals = classify_txt_records(&["v=DMARC1; p=none", "note: p=reject elsewhere"]);
        assert!(signals.dmarc);
        assert!(!signals.dmarc_strong);
    }

    #[test]
    fn no_records_means_all_negative() {
        assert_eq!(classify_txt_records::<&str>(&[]), MailAuthSignals::default());
        let unrelated = classify_txt_records(&["google-site-verification=abc"]);
        assert_eq!(unrelated, MailAuthSignals::default());
    }

    #[test]
    fn dns_signals_are_always_written() {
        let mut report = ScanReport::new();
        DnsSignals::default().record(&mut report);
        for signal in [
            Signal::DnsARecord,
            Signal::DnsAaaaRecord,
            Signal::DnsCaaRecord,
            Signal::DnsSpf,
            Signal::DnsDkim,
            Signal::DnsDmarc,
            Signal::IsDmarcStrong,
        ] {
            assert_eq!(report.flag(signal), Some(false), "{signal}");
        }
    }
}
