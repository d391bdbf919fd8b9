//! Rule registry (§4.2, §9): a single static table indexed by rule ID.
//! Addition is a code change; the table is never mutated at runtime.
//!
//! Exposes `get_rule(id)` and `new_finding(...)` as the registry's public
//! `getRule`/`newFinding` contract.

use std::sync::LazyLock;

use uuid::Uuid;

use crate::error::{WebscanError, WebscanResult};
use crate::model::{Confidence, Finding, RuleDef, RuleFamily, Severity};
use crate::owasp::OwaspCategory;

macro_rules! rule {
    ($id:literal, $family:expr, $sev:expr, $conf:expr, $owasp:expr, $desc:literal, $rem:literal, [$($refs:literal),* $(,)?]) => {
        RuleDef {
            id: $id,
            family: $family,
            default_severity: $sev,
            default_confidence: $conf,
            owasp_category: $owasp,
            description: $desc,
            remediation: $rem,
            references: &[$($refs),*],
        }
    };
}

/// The immutable rule table. One entry per rule family named in §4.2,
/// enumerated with the specific IDs the dynamic probers and static
/// analysers cite (§8's end-to-end scenarios name families and a handful
/// of concrete IDs; the remainder follow the same numbering convention
/// within each family).
static RULES: LazyLock<Vec<RuleDef>> = LazyLock::new(|| {
    vec![
        rule!(
            "WSS-SEC-001", RuleFamily::Sec, Severity::Medium, Confidence::High, "A02:2025",
            "Content-Security-Policy header is missing",
            "Add a restrictive Content-Security-Policy header or meta tag.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
        rule!(
            "WSS-SEC-002", RuleFamily::Sec, Severity::Medium, Confidence::High, "A02:2025",
            "Content-Security-Policy permits unsafe-inline or unsafe-eval",
            "Remove unsafe-inline/unsafe-eval from the policy and use nonces or hashes.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
        rule!(
            "WSS-SEC-003", RuleFamily::Sec, Severity::Low, Confidence::High, "A02:2025",
            "HTTP response is missing a recommended security header",
            "Set the missing security header on all responses.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
        rule!(
            "WSS-SEC-004", RuleFamily::Sec, Severity::High, Confidence::High, "A04:2025",
            "Target is served over plaintext HTTP",
            "Redirect all HTTP traffic to HTTPS and enable HSTS.",
            ["https://cwe.mitre.org/data/definitions/319.html"]
        ),
        rule!(
            "WSS-XSS-001", RuleFamily::Xss, Severity::High, Confidence::Medium, "A05:2025",
            "Reflected input rendered inside an HTML element without encoding",
            "HTML-encode all user-controlled values before rendering.",
            ["https://owasp.org/Top10/2025/A05_2025-Injection/"]
        ),
        rule!(
            "WSS-XSS-002", RuleFamily::Xss, Severity::High, Confidence::High, "A05:2025",
            "Reflected input rendered inside a script or event-handler context",
            "Never interpolate user input into script or attribute contexts; use safe DOM APIs.",
            ["https://owasp.org/Top10/2025/A05_2025-Injection/"]
        ),
        rule!(
            "WSS-XSS-003", RuleFamily::Xss, Severity::Critical, Confidence::High, "A05:2025",
            "Dangerous dynamic-evaluation sink reachable from source text",
            "Replace eval/new Function/innerHTML-style sinks with safe equivalents.",
            ["https://owasp.org/Top10/2025/A05_2025-Injection/"]
        ),
        rule!(
            "WSS-SQLI-001", RuleFamily::Sqli, Severity::High, Confidence::High, "A05:2025",
            "Database error signature observed in response body",
            "Use parameterised queries and suppress detailed database errors in responses.",
            ["https://owasp.org/Top10/2025/A05_2025-Injection/"]
        ),
        rule!(
            "WSS-PATH-001", RuleFamily::Path, Severity::High, Confidence::High, "A01:2025",
            "Path traversal payload returned sensitive file contents",
            "Validate and canonicalise file paths server-side; deny traversal sequences.",
            ["https://cwe.mitre.org/data/definitions/22.html"]
        ),
        rule!(
            "WSS-CSRF-001", RuleFamily::Csrf, Severity::Medium, Confidence::Medium, "A01:2025",
            "State-changing form lacks a CSRF token",
            "Add a per-session CSRF token to all state-changing forms and validate it server-side.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-001", RuleFamily::Auth, Severity::High, Confidence::High, "A01:2025",
            "Session cookie missing the Secure attribute on an HTTPS origin",
            "Set Secure on every session/auth cookie served over HTTPS.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-002", RuleFamily::Auth, Severity::Medium, Confidence::High, "A01:2025",
            "Session cookie missing the HttpOnly attribute",
            "Set HttpOnly on every session/auth cookie.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-003", RuleFamily::Auth, Severity::Medium, Confidence::High, "A01:2025",
            "Session cookie missing or permissive SameSite attribute",
            "Set SameSite=Lax or Strict (or None with Secure) on session cookies.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-004", RuleFamily::Auth, Severity::High, Confidence::Medium, "A01:2025",
            "Session or auth token has low entropy",
            "Issue session tokens with at least 128 bits of cryptographically secure entropy.",
            ["https://cwe.mitre.org/data/definitions/330.html"]
        ),
        rule!(
            "WSS-AUTH-005", RuleFamily::Auth, Severity::Critical, Confidence::High, "A01:2025",
            "Protected resource accessible without authentication",
            "Enforce server-side authorisation checks on every protected route.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-006", RuleFamily::Auth, Severity::High, Confidence::High, "A01:2025",
            "Protected resource accepts a tampered session token",
            "Validate session tokens server-side against server-held state, not client-supplied flags.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-AUTH-007", RuleFamily::Auth, Severity::Critical, Confidence::High, "A01:2025",
            "Parameter-based authorisation bypass",
            "Never grant access based on client-supplied request parameters.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-DEP-001", RuleFamily::Dep, Severity::High, Confidence::High, "A03:2025",
            "Dependency with a known vulnerability advisory",
            "Upgrade to a patched version per the linked advisory.",
            ["https://owasp.org/Top10/2025/A03_2025-Vulnerable_and_Outdated_Components/"]
        ),
        rule!(
            "WSS-DEP-002", RuleFamily::Dep, Severity::Low, Confidence::Medium, "A03:2025",
            "Dependency manifest could not be parsed",
            "Fix the manifest so dependency vulnerabilities can be assessed.",
            ["https://owasp.org/Top10/2025/A03_2025-Vulnerable_and_Outdated_Components/"]
        ),
        rule!(
            "WSS-FORM-001", RuleFamily::Form, Severity::Critical, Confidence::High, "A01:2025",
            "Password form submits over plaintext HTTP",
            "Serve all authentication forms exclusively over HTTPS.",
            ["https://cwe.mitre.org/data/definitions/319.html"]
        ),
        rule!(
            "WSS-FORM-002", RuleFamily::Form, Severity::Low, Confidence::Low, "A02:2025",
            "Form action is missing",
            "Set an explicit form action rather than relying on implicit submit-to-self.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
        rule!(
            "WSS-FORM-003", RuleFamily::Form, Severity::Low, Confidence::Low, "A02:2025",
            "Input field lacks client-side validation constraints",
            "Add required/pattern/maxlength constraints to reduce malformed submissions.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
        rule!(
            "WSS-EXC-001", RuleFamily::Exc, Severity::Medium, Confidence::High, "A10:2025",
            "Stack trace or framework debug output leaked in response",
            "Disable debug/stack-trace output in production and return generic error pages.",
            ["https://owasp.org/Top10/2025/A10_2025-Mishandling_of_Exceptional_Conditions/"]
        ),
        rule!(
            "WSS-EXC-002", RuleFamily::Exc, Severity::Medium, Confidence::Medium, "A10:2025",
            "Debug-mode indicator present in response",
            "Ensure debug flags are disabled in production configuration.",
            ["https://owasp.org/Top10/2025/A10_2025-Mishandling_of_Exceptional_Conditions/"]
        ),
        rule!(
            "WSS-EXC-003", RuleFamily::Exc, Severity::High, Confidence::Medium, "A10:2025",
            "Sensitive internal detail (path, connection string) leaked in an error",
            "Strip file-system paths, connection strings, and internals from error responses.",
            ["https://owasp.org/Top10/2025/A10_2025-Mishandling_of_Exceptional_Conditions/"]
        ),
        rule!(
            "WSS-XSS-004", RuleFamily::Xss, Severity::High, Confidence::High, "A05:2025",
            "innerHTML/outerHTML/document.write assignment without sanitisation",
            "Use textContent or a sanitising template library instead of raw HTML sinks.",
            ["https://owasp.org/Top10/2025/A05_2025-Injection/"]
        ),
        rule!(
            "WSS-SEC-005", RuleFamily::Sec, Severity::Critical, Confidence::Medium, "A02:2025",
            "Hardcoded secret-shaped credential found in source",
            "Remove the credential from source control and rotate it immediately.",
            ["https://cwe.mitre.org/data/definitions/798.html"]
        ),
        rule!(
            "WSS-AUTH-008", RuleFamily::Auth, Severity::Medium, Confidence::Medium, "A01:2025",
            "Cookie assigned from client-side script without secure attributes",
            "Set cookies server-side with Secure, HttpOnly, and SameSite where applicable.",
            ["https://owasp.org/Top10/2025/A01_2025-Broken_Access_Control/"]
        ),
        rule!(
            "WSS-SEC-006", RuleFamily::Sec, Severity::High, Confidence::High, "A02:2025",
            "Inline script present without a nonce, weakening CSP enforcement",
            "Move script logic to an external file or add a per-response nonce.",
            ["https://owasp.org/Top10/2025/A02_2025-Security_Misconfiguration/"]
        ),
    ]
});

/// Looks up a rule by ID. Returns `None` when the ID is not registered;
/// callers that treat this as fatal should map it to
/// [`WebscanError::UnknownRule`] (see [`new_finding`]).
pub fn get_rule(id: &str) -> Option<&'static RuleDef> {
    RULES.iter().find(|r| r.id == id)
}

/// Constructs a canonical [`Finding`] from a registered rule ID.
///
/// Evidence is trimmed to <= 500 chars with CR/LF runs collapsed to a
/// single space. Fails with [`WebscanError::UnknownRule`] when `id` is not
/// registered (§4.2 Contract).
pub fn new_finding(
    scan_id: Uuid,
    id: &str,
    location: impl Into<String>,
    evidence: impl AsRef<str>,
    description_override: Option<&str>,
) -> WebscanResult<Finding> {
    let rule = get_rule(id).ok_or_else(|| WebscanError::UnknownRule(id.to_string()))?;
    let (owasp_category, subtype) = crate::owasp::remap_owasp_label(rule.owasp_category);
    Ok(Finding {
        id: Uuid::new_v4(),
        scan_id,
        rule_id: rule.id.to_string(),
        finding_type: description_override.unwrap_or(rule.description).to_string(),
        severity: rule.default_severity,
        confidence: rule.default_confidence,
        description: description_override.unwrap_or(rule.description).to_string(),
        location: location.into(),
        remediation: rule.remediation.to_string(),
        owasp_category: owasp_category.as_str().to_string(),
        subtype: subtype.map(|s| s.to_string()),
        evidence: trim_evidence(evidence.as_ref()),
    })
}

fn trim_evidence(raw: &str) -> String {
    let collapsed: String = raw
        .split(['\r', '\n'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_id_follows_the_family_convention() {
        for rule in RULES.iter() {
            let expected_prefix = format!("WSS-{}-", rule.family.as_str());
            assert!(
                rule.id.starts_with(&expected_prefix),
                "{} does not start with {}",
                rule.id,
                expected_prefix
            );
        }
    }

    #[test]
    fn every_rule_owasp_category_is_a_valid_2025_or_legacy_label() {
        for rule in RULES.iter() {
            let (cat, _) = crate::owasp::remap_owasp_label(rule.owasp_category);
            assert!(cat.as_str().starts_with("A0") || cat.as_str().starts_with("A1"));
            assert!(cat.as_str().ends_with(":2025"));
        }
    }

    #[test]
    fn unknown_rule_id_is_rejected() {
        let err = new_finding(Uuid::new_v4(), "WSS-XSS-999", "loc", "ev", None).unwrap_err();
        assert!(matches!(err, WebscanError::UnknownRule(_)));
    }

    #[test]
    fn new_finding_copies_owasp_category_from_rule() {
        let finding =
            new_finding(Uuid::new_v4(), "WSS-PATH-001", "https://h/f?x=1", "etc passwd found", None)
                .unwrap();
        assert_eq!(finding.owasp_category, "A01:2025");
        assert_eq!(finding.rule_id, "WSS-PATH-001");
    }

    #[test]
    fn evidence_is_trimmed_and_crlf_collapsed() {
        let long = "a".repeat(600);
        let finding = new_finding(Uuid::new_v4(), "WSS-SEC-001", "https://h/", long, None).unwrap();
        assert_eq!(finding.evidence.len(), 500);

        let finding =
            new_finding(Uuid::new_v4(), "WSS-SEC-001", "https://h/", "line1\r\nline2\r\n\r\nline3", None)
                .unwrap();
        assert_eq!(finding.evidence, "line1 line2 line3");
    }
}
