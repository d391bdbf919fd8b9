//! HTML static analyser (§4.5.2).

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use uuid::Uuid;
use webscan_core::new_finding;
use webscan_core::Finding;

static CSRF_TOKEN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)csrf|xsrf|_csrf|authenticity_token|anti[_-]?forgery|__requestverificationtoken|csrfmiddlewaretoken|token")
        .unwrap()
});

const STATE_CHANGING_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

/// Runs the HTML rule set against `source`. `page_is_https` is needed for
/// the password-over-http-form check.
pub fn analyse(scan_id: Uuid, source: &str, page_is_https: bool) -> Vec<Finding> {
    let document = Html::parse_document(source);
    let mut findings = Vec::new();

    analyse_csp(scan_id, &document, &mut findings);
    analyse_inline_scripts(scan_id, &document, &mut findings);
    analyse_forms(scan_id, &document, page_is_https, &mut findings);

    findings
}

fn analyse_csp(
    scan_id: Uuid,
    document: &Html,
    findings: &mut Vec<Finding>,
) {
    let selector = Selector::parse(r#"meta[http-equiv="Content-Security-Policy" i]"#).unwrap();
    match document.select(&selector).next() {
        None => {
            if let Ok(f) = new_finding(scan_id, "WSS-SEC-001", "<head>", "no CSP meta tag present", None) {
                findings.push(f);
            }
        }
        Some(el) => {
            let content = el.value().attr("content").unwrap_or_default();
            if content.contains("unsafe-inline") || content.contains("unsafe-eval") {
                if let Ok(f) = new_finding(scan_id, "WSS-SEC-002", "<head>", content, None) {
                    findings.push(f);
                }
            }
        }
    }
}

fn analyse_inline_scripts(
    scan_id: Uuid,
    document: &Html,
    findings: &mut Vec<Finding>,
) {
    let selector = Selector::parse("script:not([src])").unwrap();
    for (i, el) in document.select(&selector).enumerate() {
        if el.value().attr("nonce").is_none() {
            if let Ok(f) = new_finding(
                scan_id,
                "WSS-SEC-006",
                format!("<script> #{i}"),
                "inline script without nonce attribute",
                None,
            ) {
                findings.push(f);
            }
        }
    }
}

fn analyse_forms(
    scan_id: Uuid,
    document: &Html,
    page_is_https: bool,
    findings: &mut Vec<Finding>,
) {
    let form_selector = Selector::parse("form").unwrap();
    let password_selector = Selector::parse(r#"input[type="password" i]"#).unwrap();
    let hidden_selector = Selector::parse(r#"input[type="hidden" i]"#).unwrap();
    let meta_csrf_selector = Selector::parse(r#"meta[name*="csrf" i], meta[name*="xsrf" i]"#).unwrap();
    let generic_input_selector =
        Selector::parse(r#"input[type="text" i], input[type="email" i], input:not([type])"#).unwrap();

    let has_meta_csrf = document.select(&meta_csrf_selector).next().is_some();

    for (i, form) in document.select(&form_selector).enumerate() {
        let method = form
            .value()
            .attr("method")
            .unwrap_or("GET")
            .to_uppercase();
        let action = form.value().attr("action");
        let has_password = form.select(&password_selector).next().is_some();

        match action {
            None => {
                if let Ok(f) = new_finding(scan_id, "WSS-FORM-002", format!("<form> #{i}"), "no action attribute", None) {
                    findings.push(f);
                }
            }
            Some(action) if action.starts_with("http://") && page_is_https && has_password => {
                if let Ok(f) = new_finding(
                    scan_id,
                    "WSS-FORM-001",
                    format!("<form> #{i}"),
                    action,
                    None,
                ) {
                    findings.push(f);
                }
            }
            _ => {}
        }

        if STATE_CHANGING_METHODS.contains(&method.as_str()) {
            let has_token_hidden_input = form.select(&hidden_selector).any(|input| {
                let named = input
                    .value()
                    .attr("name")
                    .map(|n| CSRF_TOKEN_NAME_RE.is_match(n))
                    .unwrap_or(false);
                let id_matches = input
                    .value()
                    .attr("id")
                    .map(|n| CSRF_TOKEN_NAME_RE.is_match(n))
                    .unwrap_or(false);
                let long_enough_value = input
                    .value()
                    .attr("value")
                    .map(|v| v.len() >= 16)
                    .unwrap_or(false);
                (named || id_matches) && long_enough_value
            });
            if !has_token_hidden_input && !has_meta_csrf {
                if let Ok(f) = new_finding(
                    scan_id,
                    "WSS-CSRF-001",
                    format!("<form> #{i}"),
                    format!("method={method}, no csrf-like hidden input found"),
                    None,
                ) {
                    findings.push(f);
                }
            }
        }

        for input in form.select(&generic_input_selector) {
            let has_required = input.value().attr("required").is_some();
            let has_pattern = input.value().attr("pattern").is_some();
            let has_maxlength = input.value().attr("maxlength").is_some();
            if !has_required && !has_pattern && !has_maxlength {
                if let Ok(f) = new_finding(
                    scan_id,
                    "WSS-FORM-003",
                    format!("<form> #{i}"),
                    "input missing required/pattern/maxlength",
                    None,
                ) {
                    findings.push(f);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_csp_meta_tag_flagged() {
        let findings = analyse(Uuid::new_v4(), "<html><head></head><body></body></html>", true);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-SEC-001"));
    }

    #[test]
    fn weak_csp_meta_tag_flagged() {
        let html = r#"<html><head><meta http-equiv="Content-Security-Policy" content="script-src 'unsafe-inline'"></head></html>"#;
        let findings = analyse(Uuid::new_v4(), html, true);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-SEC-002"));
        assert!(!findings.iter().any(|f| f.rule_id == "WSS-SEC-001"));
    }

    #[test]
    fn inline_script_without_nonce_flagged() {
        let html = "<html><body><script>alert(1)</script></body></html>";
        let findings = analyse(Uuid::new_v4(), html, true);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-SEC-006"));
    }

    #[test]
    fn inline_script_with_nonce_not_flagged() {
        let html = r#"<html><body><script nonce="abc123">alert(1)</script></body></html>"#;
        let findings = analyse(Uuid::new_v4(), html, true);
        assert!(!findings.iter().any(|f| f.rule_id == "WSS-SEC-006"));
    }

    #[test]
    fn csrf_less_post_form_flagged() {
        let html = r#"<html><body><form method="POST" action="/submit"></form></body></html>"#;
        let findings = analyse(Uuid::new_v4(), html, true);
        let finding = findings.iter().find(|f| f.rule_id == "WSS-CSRF-001").unwrap();
        assert_eq!(finding.severity, webscan_core::Severity::Medium);
    }

    #[test]
    fn form_with_csrf_token_not_flagged() {
        let html = r#"<html><body><form method="POST" action="/submit">
            <input type="hidden" name="csrf_token" value="0123456789abcdef0123">
        </form></body></html>"#;
        let findings = analyse(Uuid::new_v4(), html, true);
        assert!(!findings.iter().any(|f| f.rule_id == "WSS-CSRF-001"));
    }

    #[test]
    fn password_form_over_http_on_https_page_is_critical() {
        let html = r#"<html><body><form method="POST" action="http://insecure.example/login">
            <input type="password" name="pw">
        </form></body></html>"#;
        let findings = analyse(Uuid::new_v4(), html, true);
        let finding = findings.iter().find(|f| f.rule_id == "WSS-FORM-001").unwrap();
        assert_eq!(finding.severity, webscan_core::Severity::Critical);
    }

    #[test]
    fn missing_form_action_is_low() {
        let html = "<html><body><form method=\"GET\"></form></body></html>";
        let findings = analyse(Uuid::new_v4(), html, true);
        let finding = findings.iter().find(|f| f.rule_id == "WSS-FORM-002").unwrap();
        assert_eq!(finding.severity, webscan_core::Severity::Low);
    }
}
