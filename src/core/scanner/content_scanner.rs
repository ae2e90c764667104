// src/core/scanner/content_scanner.rs

use tracing::{debug, info, warn};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

use crate::core::error::{ProbeError, ProbeResult};
use crate::core::models::{ScanReport, Signal};
use crate::core::scanner::{ProbeBudget, Signals};

/// `src=` or `href=` whose value starts with `http://`, quoted or not.
/// Plain text scan: a match inside a script string literal also counts.
static RE_MIXED_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:src|href)\s*=\s*["']?\s*http://"#).unwrap());

static SEL_SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static SEL_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSignals {
    pub has_mixed_content: bool,
    pub has_sri: bool,
}

impl Signals for ContentSignals {
    fn record(self, report: &mut ScanReport) {
        report.set_flag(Signal::HasMixedContent, self.has_mixed_content);
        report.set_flag(Signal::HasSri, self.has_sri);
    }
}

pub fn has_mixed_content(body: &str) -> bool {
    RE_MIXED_CONTENT.is_match(body)
}

/// True unless some `<script src>` or `<link href>` pointing at another
/// origin over http(s) lacks an `integrity` attribute. Resources on `host`
/// itself and on `localhost` are exempt.
pub fn has_sri(body: &str, host: &str) -> bool {
    let document = Html::parse_document(body);

    let scripts = document.select(&SEL_SCRIPT).filter_map(|el| {
        let value = el.value();
        value.attr("src").map(|src| (src, value.attr("integrity").is_some()))
    });
    let links = document.select(&SEL_LINK).filter_map(|el| {
        let value = el.value();
        value.attr("href").map(|href| (href, value.attr("integrity").is_some()))
    });

    for (resource, has_integrity) in scripts.chain(links) {
        if has_integrity || !requires_integrity(resource, host) {
            continue;
        }
        debug!(resource, "External resource without integrity attribute.");
        return false;
    }
    true
}

fn requires_integrity(resource: &str, host: &str) -> bool {
    let trimmed = resource.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
        return false;
    }
    match Url::parse(trimmed).ok().and_then(|url| url.host_str().map(str::to_ascii_lowercase)) {
        Some(resource_host) => resource_host != host.to_ascii_lowercase() && resource_host != "localhost",
        // Unparseable absolute URL: nothing to exempt it on.
        None => true,
    }
}

pub fn inspect_content(body: &str, host: &str) -> ContentSignals {
    ContentSignals {
        has_mixed_content: has_mixed_content(body),
        has_sri: has_sri(body, host),
    }
}

/// Fetches the page over HTTPS (certificate verified against the webpki
/// roots, as the reachability check does) and scans its HTML.
pub async fn run_content_scan(
    url: &Url,
    host: &str,
    user_agent: &str,
    timeout: Duration,
    budget: &ProbeBudget,
) -> ProbeResult<ContentSignals> {
    info!(url = %url, "Starting content scan.");

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;

    let body = budget
        .run(Some(timeout), async {
            let response = client.get(url.clone()).send().await?;
            debug!(status = %response.status(), "Received HTTP response for content scan.");
            Ok::<_, ProbeError>(response.text().await?)
        })
        .await
        .inspect_err(|e| warn!(url = %url, error = %e, "Failed to fetch page body."))?;
    debug!(bytes = body.len(), "Successfully read response body.");

    let signals = inspect_content(&body, host);
    info!(?signals, "Content scan finished.");
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "example.com";

    #[test]
    fn plain_http_resources_are_mixed_content() {
        assert!(has_mixed_content(r#"<img src="http://cdn.example.net/a.png">"#));
        assert!(has_mixed_content(r#"<a HREF='http://example.com/'>x</a>"#));
        assert!(has_mixed_content(r#"<script src=http://evil.test/x.js></script>"#));
        assert!(has_mixed_content(r#"<img src = " http://cdn.example.net/a.png">"#));
    }

    #[test]
    fn https_and_relative_resources_are_clean() {
        let body = r#"
            <link rel="stylesheet" href="https://cdn.example.net/site.css">
            <script src="/app.js"></script>
            <a href="//example.com/page">protocol relative</a>
            <p>Visit http://example.com in your browser</p>
        "#;
        assert!(!has_mixed_content(body));
    }

    #[test]
    fn literal_inside_script_is_an_accepted_false_positive() {
        assert!(has_mixed_content(r#"<script>var s = 'src="http://x.test/"';</script>"#));
    }

    #[test]
    fn external_script_without_integrity_fails_sri() {
        let body = r#"<html><head><script src="https://cdn.jsdelivr.net/npm/lib.js"></script></head></html>"#;
        assert!(!has_sri(body, HOST));
    }

    #[test]
    fn external_resources_with_integrity_pass_sri() {
        let body = r#"<html><head>
            <script src="https://cdn.jsdelivr.net/npm/lib.js" integrity="sha384-abc" crossorigin="anonymous"></script>
            <link rel="stylesheet" href="https://cdn.example.net/x.css" integrity="sha384-def">
        </head></html>"#;
        assert!(has_sri(body, HOST));
    }

    #[test]
    fn same_origin_localhost_and_relative_resources_are_exempt() {
        let body = r#"<html><head>
            <script src="https://example.com/static/app.js"></script>
            <script src="http://localhost:3000/dev.js"></script>
            <script src="/relative.js"></script>
            <link rel="icon" href="favicon.ico">
        </head></html>"#;
        assert!(has_sri(body, HOST));
    }

    #[test]
    fn external_link_without_integrity_fails_sri() {
        let body = r#"<html><head><link rel="stylesheet" href="https://fonts.googleapis.com/css?family=Roboto"></head></html>"#;
        assert!(!has_sri(body, HOST));
    }

    #[test]
    fn page_without_resources_passes_sri() {
        assert!(has_sri("<html><body><p>hello</p></body></html>", HOST));
        assert!(has_sri("", HOST));
    }

    #[test]
    fn inspect_content_combines_both_checks() {
        let body = r#"<html><head><script src="http://cdn.example.net/a.js"></script></head></html>"#;
        let signals = inspect_content(body, HOST);
        assert!(signals.has_mixed_content);
        assert!(!signals.has_sri);

        let mut report = ScanReport::new();
        signals.record(&mut report);
        assert_eq!(report.flag(Signal::HasMixedContent), Some(true));
        assert_eq!(report.flag(Signal::HasSri), Some(false));
    }
}
