//! JavaScript/TypeScript static analyser (§4.5.1).

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;
use webscan_core::{new_finding, Finding};

use crate::context::{adjust_confidence, AnalysisContext};

struct SinkRule {
    rule_id: &'static str,
    pattern: &'static Regex,
    is_eval_family: bool,
}

static LINE_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").unwrap());
static BLOCK_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static EVAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\beval\s*\(").unwrap());
static NEW_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"new\s+Function\s*\(").unwrap());
static INNER_HTML_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.innerHTML\s*=").unwrap());
static OUTER_HTML_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.outerHTML\s*=").unwrap());
static DOCUMENT_WRITE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"document\.write\s*\(").unwrap());
static INSECURE_COOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"document\.cookie\s*=").unwrap());
static STRING_TIMER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"set(?:Timeout|Interval)\s*\(\s*["']"#).unwrap());

static SECRET_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sk_live_[A-Za-z0-9]{16,}|AKIA[A-Z0-9]{16}|ghp_[A-Za-z0-9]{20,}|glpat-[A-Za-z0-9\-_]{16,})\b")
        .unwrap()
});

static FRAMEWORK_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@angular/core|@Component|React\.createElement|from\s+['\"]react['\"]|createApp\(|defineComponent\(|@sveltejs|jQuery|\$\.ajax",
    )
    .unwrap()
});
static LODASH_CALL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b_\.\w+\(").unwrap());
static WEBPACK_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"webpackBootstrap|__webpack_require__").unwrap());
static UMD_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"typeof\s+exports.*typeof\s+module.*typeof\s+define").unwrap()
});
static TERSER_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!function\(.*\)\(.*\)").unwrap());

fn sink_rules() -> Vec<SinkRule> {
    vec![
        SinkRule { rule_id: "WSS-XSS-003", pattern: &EVAL_RE, is_eval_family: true },
        SinkRule { rule_id: "WSS-XSS-003", pattern: &NEW_FUNCTION_RE, is_eval_family: true },
        SinkRule { rule_id: "WSS-XSS-004", pattern: &INNER_HTML_RE, is_eval_family: false },
        SinkRule { rule_id: "WSS-XSS-004", pattern: &OUTER_HTML_RE, is_eval_family: false },
        SinkRule { rule_id: "WSS-XSS-004", pattern: &DOCUMENT_WRITE_RE, is_eval_family: false },
        SinkRule { rule_id: "WSS-AUTH-008", pattern: &INSECURE_COOKIE_RE, is_eval_family: false },
        SinkRule { rule_id: "WSS-XSS-003", pattern: &STRING_TIMER_RE, is_eval_family: true },
    ]
}

/// Walks backward from `idx` to the nearest char boundary, so a byte offset
/// landing inside a multibyte UTF-8 character can still slice the string.
fn char_boundary_at_or_before(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Walks forward from `idx` to the nearest char boundary.
fn char_boundary_at_or_after(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Strips line and block comments to suppress comment-only matches.
fn strip_comments(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT_RE.replace_all(source, "");
    LINE_COMMENT_RE.replace_all(&without_blocks, "").into_owned()
}

fn detect_framework(source: &str) -> bool {
    if FRAMEWORK_MARKERS.is_match(source) {
        return true;
    }
    LODASH_CALL_RE.find_iter(source).count() >= 3
}

fn detect_minified(source: &str) -> bool {
    if source
        .lines()
        .any(|line| line.len() > 500 && !line.contains('\n'))
    {
        return true;
    }
    if WEBPACK_MARKERS.is_match(source) || UMD_MARKERS.is_match(source) || TERSER_HEADER_RE.is_match(source) {
        return true;
    }
    source.lines().any(|line| {
        let mut count = 0;
        let bytes = line.as_bytes();
        for window_start in 0..bytes.len() {
            let window_end = (window_start + 100).min(bytes.len());
            let window = &line[window_start..window_end];
            count = count.max(
                window
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|tok| tok.len() == 1 && tok.chars().next().unwrap().is_alphabetic())
                    .count(),
            );
        }
        count >= 10
    })
}

/// Which framework tag describes the detected context, used only to render
/// the "(Found in X code - likely library code)" description suffix.
fn framework_label(source: &str) -> &'static str {
    if source.contains("@angular/core") || source.contains("@Component") {
        "Angular"
    } else if source.contains("React.createElement") || source.contains("react") {
        "React"
    } else if source.contains("createApp(") || source.contains("defineComponent(") {
        "Vue"
    } else if source.contains("@sveltejs") {
        "Svelte"
    } else {
        "a third-party library"
    }
}

/// Runs the JS/TS rule set against `source`, returning canonical Findings.
pub fn analyse(scan_id: Uuid, source: &str, filename: &str, has_csp: bool) -> Vec<Finding> {
    let cleaned = strip_comments(source);
    let is_framework = detect_framework(&cleaned);
    let is_minified = detect_minified(&cleaned);

    let mut findings = Vec::new();

    for rule in sink_rules() {
        if let Some(m) = rule.pattern.find(&cleaned) {
            let line_number = cleaned[..m.start()].matches('\n').count() + 1;
            let context_start = char_boundary_at_or_before(&cleaned, m.start().saturating_sub(50));
            let context_end = char_boundary_at_or_after(&cleaned, (m.end() + 50).min(cleaned.len()));
            let evidence = format!(
                "{}:{}: {}",
                filename, line_number, &cleaned[context_start..context_end]
            );

            let ctx = AnalysisContext {
                is_framework,
                is_minified,
                has_csp,
                is_eval_family: rule.is_eval_family,
            };

            let description_override = if is_framework && rule.is_eval_family {
                Some(format!(
                    "Dangerous dynamic-evaluation sink reachable from source text (Found in {} code - likely library code)",
                    framework_label(&cleaned)
                ))
            } else {
                None
            };

            if let Ok(mut finding) = new_finding(
                scan_id,
                rule.rule_id,
                format!("{filename}:{line_number}"),
                &evidence,
                description_override.as_deref(),
            ) {
                finding.confidence = adjust_confidence(finding.confidence, ctx);
                findings.push(finding);
            }
        }
    }

    for cap in SECRET_SHAPE_RE.captures_iter(&cleaned) {
        let m = cap.get(0).unwrap();
        let line_number = cleaned[..m.start()].matches('\n').count() + 1;
        if let Ok(finding) = new_finding(
            scan_id,
            "WSS-SEC-005",
            format!("{filename}:{line_number}"),
            m.as_str(),
            None,
        ) {
            findings.push(finding);
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_eval_is_flagged() {
        let findings = analyse(Uuid::new_v4(), "function f() { eval('2+2'); }", "app.js", false);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-XSS-003"));
    }

    #[test]
    fn multibyte_context_near_sink_does_not_panic() {
        let padding = "\u{00e9}".repeat(60);
        let source = format!("const s = \"{padding}\"; eval('2+2');");
        let findings = analyse(Uuid::new_v4(), &source, "app.js", false);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-XSS-003"));
    }

    #[test]
    fn commented_out_eval_is_not_flagged() {
        let findings = analyse(Uuid::new_v4(), "// eval('2+2');\nconst x = 1;", "app.js", false);
        assert!(findings.is_empty());
    }

    #[test]
    fn framework_code_downgrades_confidence_and_annotates_description() {
        let source = "import '@angular/core';\neval('2+2');";
        let findings = analyse(Uuid::new_v4(), source, "app.ts", false);
        let finding = findings
            .iter()
            .find(|f| f.rule_id == "WSS-XSS-003")
            .unwrap();
        assert_eq!(finding.confidence, webscan_core::Confidence::Medium);
        assert!(finding.description.ends_with("(Found in Angular code - likely library code)"));
        assert_eq!(finding.severity, webscan_core::Severity::Critical);
    }

    #[test]
    fn csp_downgrades_eval_family_further() {
        let source = "eval('2+2');";
        let findings = analyse(Uuid::new_v4(), source, "app.js", true);
        let finding = findings.iter().find(|f| f.rule_id == "WSS-XSS-003").unwrap();
        assert_eq!(finding.confidence, webscan_core::Confidence::Low);
    }

    #[test]
    fn inner_html_assignment_is_flagged() {
        let findings = analyse(Uuid::new_v4(), "el.innerHTML = userInput;", "app.js", false);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-XSS-004"));
    }

    #[test]
    fn hardcoded_secret_shape_is_flagged() {
        let source = "const key = 'sk_live_abcdefghijklmnop1234';";
        let findings = analyse(Uuid::new_v4(), source, "app.js", false);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-SEC-005"));
    }

    #[test]
    fn insecure_cookie_assignment_is_flagged() {
        let findings = analyse(Uuid::new_v4(), "document.cookie = 'a=b';", "app.js", false);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-AUTH-008"));
    }
}
