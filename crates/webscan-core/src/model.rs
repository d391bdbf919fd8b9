//! Core entities: [`Scan`], [`Finding`], [`SecurityTest`], [`RuleDef`].
//!
//! Field semantics mirror the data model binding: a Scan owns many Findings
//! and many SecurityTests; Findings soft-reference a RuleDef by rule ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scan execution mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanMode {
    Static,
    Dynamic,
    Both,
}

impl ScanMode {
    pub fn runs_static(self) -> bool {
        matches!(self, ScanMode::Static | ScanMode::Both)
    }

    pub fn runs_dynamic(self) -> bool {
        matches!(self, ScanMode::Dynamic | ScanMode::Both)
    }
}

/// Lifecycle state of a [`Scan`]. Transitions are monotone:
/// `PENDING -> RUNNING -> {COMPLETED, FAILED}`, and never leave a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// Phase a running scan is currently executing, surfaced via `status()`
/// and carried on Log Bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanPhase {
    Static,
    Dynamic,
    Crawl,
    Auth,
    Score,
}

/// Letter grade derived from a completed scan's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: i32) -> Grade {
        match score {
            s if s >= 95 => Grade::APlus,
            s if s >= 90 => Grade::A,
            s if s >= 80 => Grade::B,
            s if s >= 70 => Grade::C,
            s if s >= 60 => Grade::D,
            _ => Grade::F,
        }
    }
}

/// Qualitative risk band derived from a completed scan's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    pub fn from_score(score: i32) -> RiskBand {
        match score {
            s if s >= 80 => RiskBand::Low,
            s if s >= 60 => RiskBand::Medium,
            s if s >= 40 => RiskBand::High,
            _ => RiskBand::Critical,
        }
    }
}

/// A single scan record. `score`/`completed_at` are only populated once the
/// scan reaches a terminal state; `score` remains `None` for FAILED scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub target_url: String,
    pub hostname: String,
    pub mode: ScanMode,
    pub status: ScanStatus,
    pub phase: Option<ScanPhase>,
    pub score: Option<i32>,
    pub grade: Option<Grade>,
    pub risk_band: Option<RiskBand>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form blob: raw headers, cookies, CSP, crawl metadata, failure reason.
    pub summary: serde_json::Value,
}

impl Scan {
    pub fn new(target_url: String, hostname: String, mode: ScanMode) -> Self {
        Scan {
            id: Uuid::new_v4(),
            target_url,
            hostname,
            mode,
            status: ScanStatus::Pending,
            phase: None,
            score: None,
            grade: None,
            risk_band: None,
            created_at: Utc::now(),
            completed_at: None,
            summary: serde_json::json!({}),
        }
    }

    /// Applies the final score, deriving grade and risk band, and marks
    /// the scan COMPLETED. Caller is responsible for the commit boundary.
    pub fn complete_with_score(&mut self, score: i32) {
        let clamped = score.clamp(0, 100);
        self.score = Some(clamped);
        self.grade = Some(Grade::from_score(clamped));
        self.risk_band = Some(RiskBand::from_score(clamped));
        self.status = ScanStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: &str) {
        self.status = ScanStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.summary["failureReason"] = serde_json::Value::String(reason.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Rule ID family, the middle segment of `WSS-<FAMILY>-<NNN>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleFamily {
    Xss,
    Sqli,
    Path,
    Csrf,
    Sec,
    Auth,
    Dep,
    Form,
    Exc,
}

impl RuleFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleFamily::Xss => "XSS",
            RuleFamily::Sqli => "SQLI",
            RuleFamily::Path => "PATH",
            RuleFamily::Csrf => "CSRF",
            RuleFamily::Sec => "SEC",
            RuleFamily::Auth => "AUTH",
            RuleFamily::Dep => "DEP",
            RuleFamily::Form => "FORM",
            RuleFamily::Exc => "EXC",
        }
    }
}

/// Static, process-wide rule definition. The registry (`webscan_core::registry`)
/// is the only place these are constructed; findings soft-reference them by ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: &'static str,
    pub family: RuleFamily,
    pub default_severity: Severity,
    pub default_confidence: Confidence,
    pub owasp_category: OwaspCategoryRef,
    pub description: &'static str,
    pub remediation: &'static str,
    pub references: &'static [&'static str],
}

/// Lightweight copy of an OWASP category label used inside [`RuleDef`] so this
/// module doesn't need a cyclic dependency on `owasp::OwaspCategory`'s enum
/// variants; `owasp::OwaspCategory::from_ref` converts back.
pub type OwaspCategoryRef = &'static str;

/// A detected vulnerability, belonging to exactly one [`Scan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub rule_id: String,
    pub finding_type: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub description: String,
    /// `file:line` for static findings, or a URL for dynamic findings.
    pub location: String,
    pub remediation: String,
    pub owasp_category: String,
    pub subtype: Option<String>,
    /// Trimmed to <= 500 bytes, CR/LF runs stripped.
    pub evidence: String,
}

/// Outcome of a single [`SecurityTest`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestResult {
    Passed,
    Failed,
    Info,
    #[serde(rename = "N/A")]
    NotApplicable,
}

/// A single pass/fail check recorded against a scan with a signed score
/// contribution (typically -25..=+5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityTest {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub name: String,
    pub passed: bool,
    pub score_contribution: i32,
    pub result: TestResult,
    pub reason: String,
    pub recommendation: String,
    pub details: serde_json::Value,
}

impl SecurityTest {
    pub fn new(
        scan_id: Uuid,
        name: impl Into<String>,
        passed: bool,
        score_contribution: i32,
        result: TestResult,
        reason: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        SecurityTest {
            id: Uuid::new_v4(),
            scan_id,
            name: name.into(),
            passed,
            score_contribution,
            result,
            reason: reason.into(),
            recommendation: recommendation.into(),
            details: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands() {
        assert!(matches!(Grade::from_score(100), Grade::APlus));
        assert!(matches!(Grade::from_score(95), Grade::APlus));
        assert!(matches!(Grade::from_score(94), Grade::A));
        assert!(matches!(Grade::from_score(90), Grade::A));
        assert!(matches!(Grade::from_score(89), Grade::B));
        assert!(matches!(Grade::from_score(80), Grade::B));
        assert!(matches!(Grade::from_score(79), Grade::C));
        assert!(matches!(Grade::from_score(69), Grade::D));
        assert!(matches!(Grade::from_score(59), Grade::F));
        assert!(matches!(Grade::from_score(0), Grade::F));
    }

    #[test]
    fn risk_band_bands() {
        assert!(matches!(RiskBand::from_score(80), RiskBand::Low));
        assert!(matches!(RiskBand::from_score(79), RiskBand::Medium));
        assert!(matches!(RiskBand::from_score(60), RiskBand::Medium));
        assert!(matches!(RiskBand::from_score(59), RiskBand::High));
        assert!(matches!(RiskBand::from_score(40), RiskBand::High));
        assert!(matches!(RiskBand::from_score(39), RiskBand::Critical));
    }

    #[test]
    fn scan_mode_dispatch() {
        assert!(ScanMode::Static.runs_static());
        assert!(!ScanMode::Static.runs_dynamic());
        assert!(ScanMode::Dynamic.runs_dynamic());
        assert!(!ScanMode::Dynamic.runs_static());
        assert!(ScanMode::Both.runs_static() && ScanMode::Both.runs_dynamic());
    }

    #[test]
    fn completing_a_scan_clamps_and_derives() {
        let mut scan = Scan::new("https://h/".into(), "h".into(), ScanMode::Both);
        scan.complete_with_score(137);
        assert_eq!(scan.score, Some(100));
        assert_eq!(scan.status, ScanStatus::Completed);
        assert!(scan.completed_at.is_some());
    }

    #[test]
    fn failing_a_scan_leaves_score_null() {
        let mut scan = Scan::new("https://h/".into(), "h".into(), ScanMode::Dynamic);
        scan.fail("seed unreachable");
        assert_eq!(scan.score, None);
        assert_eq!(scan.status, ScanStatus::Failed);
        assert!(scan.completed_at.is_some());
    }
}
