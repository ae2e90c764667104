// src/core/scoring.rs

use tracing::debug;

use crate::core::models::{CheckRule, ScanReport, ScoreResult, SignalValue};
use crate::core::rules::reference_rules;

/// Scores a report against the reference policy. Pure and infallible.
pub fn score(report: &ScanReport) -> ScoreResult {
    score_with_rules(report, &reference_rules())
}

/// Scores a report against an arbitrary rule table.
///
/// A present signal is counted and passes when it equals the rule's pass
/// value. An absent signal counts as a failure for always-counted rules and
/// is skipped otherwise. Checks are reported in table order; the score and
/// the pass/fail sets do not depend on that order.
pub fn score_with_rules(report: &ScanReport, rules: &[CheckRule]) -> ScoreResult {
    let mut passed_checks = Vec::new();
    let mut failed_checks = Vec::new();

    for rule in rules {
        match report.get(rule.key) {
            Some(value) if *value == SignalValue::Flag(rule.pass_value) => passed_checks.push(rule.key),
            Some(_) => failed_checks.push(rule.key),
            None if rule.always_counted => failed_checks.push(rule.key),
            None => debug!(check = %rule.key, "Signal absent, optional check skipped."),
        }
    }

    let score = percentage(passed_checks.len(), passed_checks.len() + failed_checks.len());
    debug!(score, passed = passed_checks.len(), failed = failed_checks.len(), "Report scored.");

    ScoreResult { score, passed_checks, failed_checks }
}

/// `round(100 * passed / total)` with halves rounded up, in integer arithmetic.
/// Zero when nothing was counted.
fn percentage(passed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * passed + total) / (2 * total);
    // passed <= total, so rounded <= 100.
    rounded as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Signal;
    use crate::core::rules::reference_rules;
    use std::collections::HashSet;

    fn report(flags: &[(Signal, bool)]) -> ScanReport {
        let mut report = ScanReport::new();
        for (signal, value) in flags {
            report.set_flag(*signal, *value);
        }
        report
    }

    fn mixed_report() -> ScanReport {
        report(&[
            (Signal::Https, true),
            (Signal::HasMixedContent, true),
            (Signal::HasWeakCiphers, false),
            (Signal::HasCsp, false),
            (Signal::HasHsts, true),
            (Signal::DnsARecord, true),
            (Signal::DnsSpf, true),
            (Signal::DnsDmarc, false),
            (Signal::HasSri, false),
        ])
    }

    fn as_set(checks: &[Signal]) -> HashSet<Signal> {
        checks.iter().copied().collect()
    }

    #[test]
    fn scenario_a_all_always_counted_checks_pass() {
        let result = score(&report(&[
            (Signal::Https, true),
            (Signal::HasMixedContent, false),
            (Signal::IsTlsOutdated, false),
            (Signal::HasXFrameOptions, true),
            (Signal::DnsARecord, true),
        ]));
        assert_eq!(result.score, 100);
        assert_eq!(result.denominator(), 5);
        assert!(result.failed_checks.is_empty());
    }

    #[test]
    fn scenario_b_absent_always_counted_checks_fail() {
        // has_mixed_content and is_tls_outdated are absent too, and also counted.
        let result = score(&report(&[(Signal::Https, false), (Signal::DnsARecord, false)]));
        assert_eq!(result.score, 0);
        assert!(result.passed_checks.is_empty());
        assert_eq!(
            result.failed_checks,
            vec![
                Signal::Https,
                Signal::HasMixedContent,
                Signal::IsTlsOutdated,
                Signal::HasXFrameOptions,
                Signal::DnsARecord,
            ]
        );
    }

    #[test]
    fn scenario_b_with_only_the_documented_rules() {
        let rules = [
            CheckRule { key: Signal::Https, pass_value: true, always_counted: true },
            CheckRule { key: Signal::DnsARecord, pass_value: true, always_counted: true },
            CheckRule { key: Signal::HasXFrameOptions, pass_value: true, always_counted: true },
            CheckRule { key: Signal::HasCsp, pass_value: true, always_counted: false },
        ];
        let result = score_with_rules(&report(&[(Signal::Https, false), (Signal::DnsARecord, false)]), &rules);
        assert_eq!(result.denominator(), 3);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn scenario_c_optional_only_absence_hits_zero_floor() {
        let rules = [CheckRule { key: Signal::HasCsp, pass_value: true, always_counted: false }];
        let result = score_with_rules(&ScanReport::new(), &rules);
        assert_eq!(result.score, 0);
        assert_eq!(result.denominator(), 0);
    }

    #[test]
    fn empty_report_with_empty_table_is_zero() {
        let result = score_with_rules(&ScanReport::new(), &[]);
        assert_eq!(result, ScoreResult { score: 0, passed_checks: vec![], failed_checks: vec![] });
    }

    #[test]
    fn empty_report_fails_only_always_counted_rules() {
        let result = score(&ScanReport::new());
        assert_eq!(result.score, 0);
        assert_eq!(result.failed_checks.len(), 5);
        assert!(result.passed_checks.is_empty());
    }

    #[test]
    fn absent_optional_signals_do_not_penalize() {
        let base = report(&[
            (Signal::Https, true),
            (Signal::HasMixedContent, false),
            (Signal::IsTlsOutdated, false),
            (Signal::HasXFrameOptions, true),
            (Signal::DnsARecord, true),
        ]);
        let mut with_missing_csp = base.clone();
        with_missing_csp.set_flag(Signal::HasCsp, false);

        assert_eq!(score(&base).score, 100);
        // 5 of 6
        assert_eq!(score(&with_missing_csp).score, 83);
    }

    #[test]
    fn denominator_counts_present_keys_and_absent_always_counted() {
        let report = mixed_report();
        let rules = reference_rules();
        let expected = rules
            .iter()
            .filter(|rule| report.contains(rule.key) || rule.always_counted)
            .count();
        let result = score_with_rules(&report, &rules);
        assert_eq!(result.denominator(), expected);

        // https, has_weak_ciphers, has_hsts, dns_a_record, dns_spf pass; has_sri has no rule.
        assert_eq!(
            as_set(&result.passed_checks),
            as_set(&[Signal::Https, Signal::HasWeakCiphers, Signal::HasHsts, Signal::DnsARecord, Signal::DnsSpf])
        );
        assert_eq!(
            as_set(&result.failed_checks),
            as_set(&[
                Signal::HasMixedContent,
                Signal::IsTlsOutdated,
                Signal::HasXFrameOptions,
                Signal::HasCsp,
                Signal::DnsDmarc,
            ])
        );
        assert_eq!(result.score, 50);
    }

    #[test]
    fn permuting_the_table_keeps_score_and_sets() {
        let report = mixed_report();
        let rules = reference_rules();
        let baseline = score_with_rules(&report, &rules);

        let mut reversed = rules.clone();
        reversed.reverse();
        let mut rotated = rules.clone();
        rotated.rotate_left(7);

        for permuted in [reversed, rotated] {
            let result = score_with_rules(&report, &permuted);
            assert_eq!(result.score, baseline.score);
            assert_eq!(as_set(&result.passed_checks), as_set(&baseline.passed_checks));
            assert_eq!(as_set(&result.failed_checks), as_set(&baseline.failed_checks));
            // Reported order follows the table handed in.
            let table_order: Vec<Signal> = permuted
                .iter()
                .map(|rule| rule.key)
                .filter(|key| result.passed_checks.contains(key))
                .collect();
            assert_eq!(result.passed_checks, table_order);
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let report = mixed_report();
        assert_eq!(score(&report), score(&report));
    }

    #[test]
    fn mistyped_value_counts_as_failure() {
        let report: ScanReport = serde_json::from_str(r#"{"https": "true"}"#).unwrap();
        let result = score(&report);
        assert!(result.failed_checks.contains(&Signal::Https));
    }

    #[test]
    fn null_signal_scores_like_an_absent_one() {
        let with_null: ScanReport = serde_json::from_str(r#"{"https":true,"tls_version":null,"has_csp":null}"#).unwrap();
        let without: ScanReport = serde_json::from_str(r#"{"https":true}"#).unwrap();
        assert_eq!(score(&with_null), score(&without));
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 8), 13); // 12.5
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(7, 7), 100);
        assert_eq!(percentage(0, 7), 0);
        assert_eq!(percentage(0, 0), 0);
    }
}
