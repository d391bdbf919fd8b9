//! Score & Taxonomy Engine (§4.7). A pure, side-effect-free function library:
//! the orchestrator hands it a completed scan's tests and findings, and it
//! hands back a score/grade/risk-band and an OWASP coverage summary ready
//! to persist. Grounded on the additive-clamp algorithm in §4.7 rather than
//! the CVSS-style weighting in `other_examples`' OWASP scanner, which this
//! engine's `OwaspCoverage` summary otherwise mirrors the shape of.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use webscan_core::{Finding, Grade, RiskBand, SecurityTest, Severity};

const STARTING_SCORE: i32 = 100;

/// The score half of a completed scan: clamp-accumulated from 100 by every
/// [`SecurityTest`]'s signed contribution, with grade/risk-band derived the
/// same way `Scan::complete_with_score` derives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: i32,
    pub grade: Grade,
    pub risk_band: RiskBand,
}

/// Sums every test's `score_contribution` onto a running total starting at
/// 100, clamping to `[0, 100]` after each addition so no single test can
/// push the cumulative score outside the valid range.
pub fn compute_score(tests: &[SecurityTest]) -> ScoreResult {
    let mut running = STARTING_SCORE;
    for test in tests {
        running = (running + test.score_contribution).clamp(0, 100);
    }
    ScoreResult {
        score: running,
        grade: Grade::from_score(running),
        risk_band: RiskBand::from_score(running),
    }
}

/// Per-OWASP-category rollup of a completed scan's findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwaspCoverage {
    pub total_findings: usize,
    pub by_category: HashMap<String, usize>,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
}

/// Tallies findings by OWASP category label and by severity. Categories
/// here are always canonical 2025 labels: [`new_finding`] remaps legacy
/// labels at ingestion, so this function never sees pre-remap input.
///
/// [`new_finding`]: webscan_core::new_finding
pub fn summarize_owasp_coverage(findings: &[Finding]) -> OwaspCoverage {
    let mut coverage = OwaspCoverage { total_findings: findings.len(), ..Default::default() };

    for finding in findings {
        *coverage.by_category.entry(finding.owasp_category.clone()).or_insert(0) += 1;
        match finding.severity {
            Severity::Critical => coverage.critical_count += 1,
            Severity::High => coverage.high_count += 1,
            Severity::Medium => coverage.medium_count += 1,
            Severity::Low => coverage.low_count += 1,
        }
    }

    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use webscan_core::{new_finding, TestResult};

    fn test_with(contribution: i32) -> SecurityTest {
        SecurityTest::new(Uuid::new_v4(), "check", contribution >= 0, contribution, TestResult::Info, "r", "rec")
    }

    #[test]
    fn empty_test_set_scores_100_a_plus() {
        let result = compute_score(&[]);
        assert_eq!(result.score, 100);
        assert!(matches!(result.grade, Grade::APlus));
        assert!(matches!(result.risk_band, RiskBand::Low));
    }

    #[test]
    fn accumulated_failures_clamp_at_zero() {
        let tests: Vec<_> = (0..10).map(|_| test_with(-25)).collect();
        let result = compute_score(&tests);
        assert_eq!(result.score, 0);
        assert!(matches!(result.grade, Grade::F));
        assert!(matches!(result.risk_band, RiskBand::Critical));
    }

    #[test]
    fn mixed_contributions_match_manual_sum() {
        let tests = vec![test_with(-25), test_with(5), test_with(-10)];
        let result = compute_score(&tests);
        assert_eq!(result.score, 70);
        assert!(matches!(result.grade, Grade::C));
        assert!(matches!(result.risk_band, RiskBand::Medium));
    }

    #[test]
    fn owasp_coverage_tallies_category_and_severity() {
        let scan_id = Uuid::new_v4();
        let findings = vec![
            new_finding(scan_id, "WSS-SEC-001", "a.js:1", "no CSP header", None).unwrap(),
            new_finding(scan_id, "WSS-AUTH-005", "https://h/admin", "no auth required", None).unwrap(),
        ];
        let coverage = summarize_owasp_coverage(&findings);
        assert_eq!(coverage.total_findings, 2);
        assert_eq!(coverage.critical_count, 1);
        assert!(coverage.by_category.values().sum::<usize>() == 2);
    }
}
