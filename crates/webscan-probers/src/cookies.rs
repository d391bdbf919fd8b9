//! Cookie analyser (§4.6.6). Parses `Set-Cookie` response headers and flags
//! session/auth cookies missing the usual hardening attributes.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;
use webscan_core::{new_finding, Finding, Severity};

static SESSION_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sess|auth|token|jwt|login|remember").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCookie {
    pub name: String,
    pub value: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

pub fn parse_set_cookie(header_value: &str) -> ParsedCookie {
    let mut parts = header_value.split(';');
    let (name, value) = parts
        .next()
        .and_then(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .unwrap_or_default();

    let mut secure = false;
    let mut http_only = false;
    let mut same_site = None;

    for attr in parts {
        let attr = attr.trim();
        let lower = attr.to_lowercase();
        if lower == "secure" {
            secure = true;
        } else if lower == "httponly" {
            http_only = true;
        } else if let Some(v) = lower.strip_prefix("samesite=") {
            same_site = Some(v.to_string());
        }
    }

    ParsedCookie { name, value, secure, http_only, same_site }
}

fn is_session_like(name: &str) -> bool {
    SESSION_LIKE_RE.is_match(name)
}

/// Evaluates all `Set-Cookie` header values seen for a target under the
/// given scheme. `is_https` gates the missing-`Secure` check.
pub fn analyse(scan_id: Uuid, url: &str, set_cookie_headers: &[String], is_https: bool) -> Vec<Finding> {
    let mut findings = Vec::new();

    for raw in set_cookie_headers {
        let cookie = parse_set_cookie(raw);
        if !is_session_like(&cookie.name) {
            continue;
        }

        if is_https && !cookie.secure {
            if let Ok(mut finding) = new_finding(
                scan_id,
                "WSS-AUTH-001",
                url.to_string(),
                format!("cookie '{}' lacks the Secure attribute over https", cookie.name),
                None,
            ) {
                finding.severity = Severity::High;
                findings.push(finding);
            }
        }

        if !cookie.http_only {
            if let Ok(mut finding) = new_finding(
                scan_id,
                "WSS-AUTH-002",
                url.to_string(),
                format!("cookie '{}' lacks the HttpOnly attribute", cookie.name),
                None,
            ) {
                finding.severity = Severity::Medium;
                findings.push(finding);
            }
        }

        let same_site_weak = match cookie.same_site.as_deref() {
            None => true,
            Some("none") if !cookie.secure => true,
            _ => false,
        };
        if same_site_weak {
            if let Ok(mut finding) = new_finding(
                scan_id,
                "WSS-AUTH-003",
                url.to_string(),
                format!("cookie '{}' has a missing or unsafe SameSite attribute", cookie.name),
                None,
            ) {
                finding.severity = Severity::Medium;
                findings.push(finding);
            }
        }

        if cookie.value.len() < 16 {
            if let Ok(mut finding) = new_finding(
                scan_id,
                "WSS-AUTH-004",
                url.to_string(),
                format!("cookie '{}' has a suspiciously short value ({} chars)", cookie.name, cookie.value.len()),
                None,
            ) {
                finding.severity = Severity::High;
                findings.push(finding);
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_value_and_attributes() {
        let cookie = parse_set_cookie("session_id=abc123def456gh; Secure; HttpOnly; SameSite=Strict; Path=/");
        assert_eq!(cookie.name, "session_id");
        assert_eq!(cookie.value, "abc123def456gh");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("strict"));
    }

    #[test]
    fn session_cookie_without_secure_over_https_is_flagged() {
        let findings = analyse(
            Uuid::new_v4(),
            "https://example.com/",
            &["session_id=abcdefghijklmnop; HttpOnly; SameSite=Strict".to_string()],
            true,
        );
        assert!(findings.iter().any(|f| f.rule_id == "WSS-AUTH-001"));
    }

    #[test]
    fn non_session_cookie_is_ignored() {
        let findings = analyse(
            Uuid::new_v4(),
            "https://example.com/",
            &["theme=dark".to_string()],
            true,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn short_token_value_triggers_weak_token_finding() {
        let findings = analyse(
            Uuid::new_v4(),
            "https://example.com/",
            &["auth_token=short; Secure; HttpOnly; SameSite=Strict".to_string()],
            true,
        );
        assert!(findings.iter().any(|f| f.rule_id == "WSS-AUTH-004"));
    }

    #[test]
    fn missing_samesite_is_flagged() {
        let findings = analyse(
            Uuid::new_v4(),
            "https://example.com/",
            &["session_id=abcdefghijklmnop; Secure; HttpOnly".to_string()],
            true,
        );
        assert!(findings.iter().any(|f| f.rule_id == "WSS-AUTH-003"));
    }
}
