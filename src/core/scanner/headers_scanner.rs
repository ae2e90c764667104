// src/core/scanner/headers_scanner.rs

use tracing::{debug, info, warn};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_SECURITY_POLICY, HeaderMap, SERVER, SET_COOKIE,
    STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use std::time::Duration;
use url::Url;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

static RE_DOTTED_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+\.\d+").unwrap());

/// Security-relevant facts read from one response's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSignals {
    pub server_header: Option<String>,
    pub has_server_version_exposed: bool,
    pub has_csp: bool,
    pub is_csp_weak: bool,
    pub has_x_frame_options: bool,
    pub has_hsts: bool,
    pub has_x_content_type_options: bool,
    pub has_permissive_cors: bool,
    pub cookies: CookieFlags,
}

/// Whether every cookie in the response carries each attribute.
/// With no cookies at all every flag stays `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieFlags {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: bool,
}

impl Default for CookieFlags {
    fn default() -> Self {
        Self { secure: true, http_only: true, same_site: true }
    }
}

impl Signals for HeaderSignals {
    fn record(self, report: &mut ScanReport) {
        if let Some(server) = self.server_header {
            report.set_text(Signal::ServerHeader, server);
        }
        report.set_flag(Signal::HasServerVersionExposed, self.has_server_version_exposed);
        report.set_flag(Signal::HasCsp, self.has_csp);
        report.set_flag(Signal::IsCspWeak, self.is_csp_weak);
        report.set_flag(Signal::HasXFrameOptions, self.has_x_frame_options);
        report.set_flag(Signal::HasHsts, self.has_hsts);
        report.set_flag(Signal::HasXContentTypeOptions, self.has_x_content_type_options);
        report.set_flag(Signal::HasPermissiveCors, self.has_permissive_cors);
        report.set_flag(Signal::HasSecureCookies, self.cookies.secure);
        report.set_flag(Signal::HasHttponlyCookies, self.cookies.http_only);
        report.set_flag(Signal::HasSamesiteCookies, self.cookies.same_site);
    }
}

/// Reads a header as text. Non-UTF-8 values are decoded lossily rather than dropped,
/// so a present header is never mistaken for a missing one.
fn header_text(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// A CSP is weak when it allows inline or eval'd script, or any source at all.
pub fn is_csp_weak(policy: &str) -> bool {
    let lowered = policy.to_ascii_lowercase();
    lowered.contains("unsafe-inline")
        || lowered.contains("unsafe-eval")
        || policy
            .split(';')
            .flat_map(str::split_whitespace)
            .any(|token| token == "*")
}

/// Folds every `Set-Cookie` value into the three attribute flags.
/// One cookie missing an attribute fails that flag for the whole response.
pub fn cookie_flags<'a>(cookies: impl IntoIterator<Item = &'a str>) -> CookieFlags {
    let mut flags = CookieFlags::default();
    for cookie in cookies {
        // The first segment is name=value; attributes follow.
        let attributes: Vec<String> = cookie
            .split(';')
            .skip(1)
            .map(|attr| attr.trim().to_ascii_lowercase())
            .collect();
        let has = |name: &str| {
            attributes
                .iter()
                .any(|attr| attr == name || attr.starts_with(&format!("{name}=")))
        };
        if !has("secure") {
            flags.secure = false;
        }
        if !has("httponly") {
            flags.http_only = false;
        }
        if !has("samesite") {
            flags.same_site = false;
        }
    }
    flags
}

/// Derives every header signal from a response's header map. Header names
/// are matched case-insensitively by `HeaderMap` itself.
pub fn inspect_headers(headers: &HeaderMap) -> HeaderSignals {
    let server_header = header_text(headers, SERVER);
    let has_server_version_exposed = server_header
        .as_deref()
        .is_some_and(|server| RE_DOTTED_VERSION.is_match(server));

    // Every policy sent is enforced; one weak policy is enough.
    let policies: Vec<String> = headers
        .get_all(CONTENT_SECURITY_POLICY)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();
    let csp_weak = policies.iter().any(|policy| is_csp_weak(policy));

    let has_permissive_cors = header_text(headers, ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_some_and(|origin| origin.trim() == "*");

    let cookie_values: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();
    debug!(cookies = cookie_values.len(), "Checking cookie attributes.");
    let cookies = cookie_flags(cookie_values.iter().map(String::as_str));

    HeaderSignals {
        server_header,
        has_server_version_exposed,
        has_csp: !policies.is_empty(),
        is_csp_weak: csp_weak,
        has_x_frame_options: headers.contains_key(X_FRAME_OPTIONS),
        has_hsts: headers.contains_key(STRICT_TRANSPORT_SECURITY),
        has_x_content_type_options: headers.contains_key(X_CONTENT_TYPE_OPTIONS),
        has_permissive_cors,
        cookies,
    }
}

/// Fetches the target as given (no certificate verification) and inspects its headers.
pub async fn run_headers_scan(url: &Url, user_agent: &str, timeout: Duration, budget: &ProbeBudget) -> ProbeResult<HeaderSignals> {
    info!(url = %url, "Starting headers scan.");

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .inspect_err(|e| warn!(error = %e, "Failed to build HTTP client for headers scan."))?;

    let response = budget
        .run(Some(timeout), async {
            Ok::<_, ProbeError>(client.get(url.clone()).send().await?)
        })
        .await
        .inspect_err(|e| warn!(url = %url, error = %e, "HTTP request failed for headers scan."))?;

    info!(status = %response.status(), "Received HTTP response for headers scan.");
    let signals = inspect_headers(response.headers());
    info!(
        has_csp = signals.has_csp,
        has_hsts = signals.has_hsts,
        has_x_frame_options = signals.has_x_frame_options,
        "Headers scan finished."
    );
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(name, value) in pairs {
            map.append(name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn hardened_response() {
        let signals = inspect_headers(&headers(&[
            ("content-security-policy", "default-src 'self'"),
            ("x-frame-options", "DENY"),
            ("x-content-type-options", "nosniff"),
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("server", "nginx"),
        ]));

        assert!(signals.has_csp);
        assert!(!signals.is_csp_weak);
        assert!(signals.has_x_frame_options);
        assert!(signals.has_x_content_type_options);
        assert!(signals.has_hsts);
        assert!(!signals.has_permissive_cors);
        assert_eq!(signals.server_header.as_deref(), Some("nginx"));
        assert!(!signals.has_server_version_exposed);
        assert_eq!(signals.cookies, CookieFlags::default());
    }

    #[test]
    fn bare_response_has_no_security_headers() {
        let signals = inspect_headers(&HeaderMap::new());
        assert!(!signals.has_csp);
        assert!(!signals.has_x_frame_options);
        assert!(!signals.has_hsts);
        assert!(!signals.has_x_content_type_options);
        assert_eq!(signals.server_header, None);

        let mut report = ScanReport::new();
        signals.record(&mut report);
        assert!(!report.contains(Signal::ServerHeader));
        // No cookies is not a finding.
        assert_eq!(report.flag(Signal::HasSecureCookies), Some(true));
    }

    #[test]
    fn header_names_match_regardless_of_case() {
        let mut map = HeaderMap::new();
        map.insert(
            reqwest::header::HeaderName::from_bytes(b"X-Frame-Options").unwrap(),
            HeaderValue::from_static("SAMEORIGIN"),
        );
        assert!(inspect_headers(&map).has_x_frame_options);
    }

    #[test]
    fn server_version_needs_three_dotted_numbers() {
        assert!(inspect_headers(&headers(&[("server", "Apache/2.4.57 (Debian)")])).has_server_version_exposed);
        assert!(inspect_headers(&headers(&[("server", "nginx/1.25.3")])).has_server_version_exposed);
        assert!(!inspect_headers(&headers(&[("server", "Microsoft-IIS/10.0")])).has_server_version_exposed);
        assert!(!inspect_headers(&headers(&[("server", "cloudflare")])).has_server_version_exposed);
    }

    #[test]
    fn weak_csp_variants() {
        assert!(is_csp_weak("script-src 'self' 'unsafe-inline'"));
        assert!(is_csp_weak("script-src 'self' 'unsafe-eval'"));
        assert!(is_csp_weak("default-src *"));
        assert!(is_csp_weak("img-src 'self';default-src *; "));
        assert!(!is_csp_weak("default-src 'self'; img-src *.example.com"));
        assert!(!is_csp_weak("default-src 'self' https://cdn.example.com"));
    }

    #[test]
    fn weak_second_csp_header_is_detected() {
        let signals = inspect_headers(&headers(&[
            ("content-security-policy", "default-src 'self'"),
            ("content-security-policy", "script-src 'self' 'unsafe-inline'"),
        ]));
        assert!(signals.has_csp);
        assert!(signals.is_csp_weak);

        let signals = inspect_headers(&headers(&[
            ("content-security-policy", "default-src 'self'"),
            ("content-security-policy", "img-src https://cdn.example.com"),
        ]));
        assert!(!signals.is_csp_weak);
    }

    #[test]
    fn cors_is_permissive_only_for_a_bare_wildcard() {
        assert!(inspect_headers(&headers(&[("access-control-allow-origin", "*")])).has_permissive_cors);
        assert!(!inspect_headers(&headers(&[("access-control-allow-origin", "https://app.example.com")])).has_permissive_cors);
        assert!(!inspect_headers(&HeaderMap::new()).has_permissive_cors);
    }

    #[test]
    fn one_non_compliant_cookie_fails_each_missing_attribute() {
        let signals = inspect_headers(&headers(&[
            ("set-cookie", "session=abc; Path=/; Secure; HttpOnly; SameSite=Lax"),
            ("set-cookie", "tracking=xyz; Path=/; Secure"),
        ]));
        assert!(signals.cookies.secure);
        assert!(!signals.cookies.http_only);
        assert!(!signals.cookies.same_site);
    }

    #[test]
    fn cookie_attributes_are_case_insensitive_and_not_matched_in_values() {
        let flags = cookie_flags(["id=1; secure; HTTPONLY; samesite=Strict"]);
        assert_eq!(flags, CookieFlags::default());

        // "secure" inside the cookie value is not the attribute.
        let flags = cookie_flags(["note=secure; HttpOnly; SameSite=None"]);
        assert!(!flags.secure);
        assert!(flags.http_only);
        assert!(flags.same_site);
    }
}
