// src/core/rules.rs

//! The scoring policy as data.
//!
//! Each entry names the signal it reads, the value that passes, and whether a
//! missing signal still counts against the target. Five checks are always
//! counted: they hold for any site that serves the web at all. The rest are
//! optional, since many legitimate sites omit them and a probe that could not
//! determine them says nothing about the target.

use serde::Serialize;

use crate::core::models::{CheckRule, ScoreResult, Signal};

/// A rule plus the human-readable context shown next to a pass or fail.
pub struct RuleDetail {
    pub rule: CheckRule,
    pub title: &'static str,
    pub description: &'static str,
}

const fn always(key: Signal, pass_value: bool) -> CheckRule {
    CheckRule { key, pass_value, always_counted: true }
}

const fn optional(key: Signal, pass_value: bool) -> CheckRule {
    CheckRule { key, pass_value, always_counted: false }
}

/// The reference policy, in reporting order.
pub static RULES: &[RuleDetail] = &[
    // --- Always counted ---
    RuleDetail {
        rule: always(Signal::Https, true),
        title: "HTTPS available",
        description: "The site answers over HTTPS with a certificate that verifies, so traffic between it and its visitors is encrypted.",
    },
    RuleDetail {
        rule: always(Signal::HasMixedContent, false),
        title: "No mixed content",
        description: "The page loads no resources over plain HTTP. A single http:// script or stylesheet undoes the protection HTTPS gives the page.",
    },
    RuleDetail {
        rule: always(Signal::IsTlsOutdated, false),
        title: "Modern TLS version",
        description: "The server negotiates TLS 1.2 or newer. TLS 1.0 and 1.1 are deprecated and exposed to attacks such as BEAST and POODLE.",
    },
    RuleDetail {
        rule: always(Signal::HasXFrameOptions, true),
        title: "X-Frame-Options set",
        description: "The X-Frame-Options header stops other origins from framing the site, which blocks clickjacking.",
    },
    RuleDetail {
        rule: always(Signal::DnsARecord, true),
        title: "IPv4 address published",
        description: "The domain has an A record, which most web clients still need to reach it.",
    },
    // --- Optional ---
    RuleDetail {
        rule: optional(Signal::HasWeakCiphers, false),
        title: "No weak cipher",
        description: "The negotiated cipher suite avoids RC4, DES, 3DES and MD5.",
    },
    RuleDetail {
        rule: optional(Signal::IsSslExpiringSoon, false),
        title: "Certificate not close to expiry",
        description: "The certificate is valid for more than 30 more days. An expired certificate makes browsers block the site.",
    },
    RuleDetail {
        rule: optional(Signal::HasSecureCookies, true),
        title: "Cookies marked Secure",
        description: "Every cookie set by the page carries the Secure attribute, so it never travels over plain HTTP.",
    },
    RuleDetail {
        rule: optional(Signal::HasHttponlyCookies, true),
        title: "Cookies marked HttpOnly",
        description: "Every cookie set by the page carries HttpOnly, keeping it out of reach of injected scripts.",
    },
    RuleDetail {
        rule: optional(Signal::HasSamesiteCookies, true),
        title: "Cookies marked SameSite",
        description: "Every cookie set by the page carries SameSite, limiting cross-site request forgery.",
    },
    RuleDetail {
        rule: optional(Signal::DnsAaaaRecord, true),
        title: "IPv6 address published",
        description: "The domain has an AAAA record and can be reached over IPv6.",
    },
    RuleDetail {
        rule: optional(Signal::HasCsp, true),
        title: "Content-Security-Policy set",
        description: "A Content-Security-Policy restricts where scripts and other resources may load from, limiting XSS and injection.",
    },
    RuleDetail {
        rule: optional(Signal::HasHsts, true),
        title: "HSTS enabled",
        description: "Strict-Transport-Security tells browsers to use HTTPS only, preventing protocol downgrade.",
    },
    RuleDetail {
        rule: optional(Signal::HasXContentTypeOptions, true),
        title: "X-Content-Type-Options set",
        description: "X-Content-Type-Options: nosniff stops browsers from guessing content types and executing disguised files.",
    },
    RuleDetail {
        rule: optional(Signal::DnsSpf, true),
        title: "SPF record published",
        description: "An SPF record lists the servers allowed to send mail for the domain, making spoofed mail easier to reject.",
    },
    RuleDetail {
        rule: optional(Signal::DnsDkim, true),
        title: "DKIM record published",
        description: "A DKIM key lets receivers verify that mail was signed by the domain and not altered in transit.",
    },
    RuleDetail {
        rule: optional(Signal::DnsDmarc, true),
        title: "DMARC record published",
        description: "A DMARC policy tells receivers what to do with mail that fails SPF and DKIM.",
    },
];

/// The bare rule table, in reporting order.
pub fn reference_rules() -> Vec<CheckRule> {
    RULES.iter().map(|detail| detail.rule).collect()
}

/// Looks up the rule (and its explanation) that scores `signal`, if any.
pub fn rule_for(signal: Signal) -> Option<&'static RuleDetail> {
    RULES.iter().find(|detail| detail.rule.key == signal)
}

/// A counted check with the text that explains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckExplanation {
    pub key: Signal,
    pub passed: bool,
    pub title: &'static str,
    pub description: &'static str,
}

/// Explains the checks behind a score: passed ones first, then failed, each
/// in the order the result lists them. Checks outside the reference policy
/// have no text and are left out.
pub fn explain(result: &ScoreResult) -> Vec<CheckExplanation> {
    let passed = result.passed_checks.iter().map(|key| (*key, true));
    let failed = result.failed_checks.iter().map(|key| (*key, false));
    passed
        .chain(failed)
        .filter_map(|(key, passed)| {
            rule_for(key).map(|detail| CheckExplanation {
                key,
                passed,
                title: detail.title,
                description: detail.description,
            })
        })
        .collect()
}
