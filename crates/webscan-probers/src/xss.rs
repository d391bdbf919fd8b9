//! Reflected-XSS prober (§4.6.1).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;
use uuid::Uuid;
use webscan_core::{new_finding, Finding};

use crate::pacing::Paced;

const MAX_URLS: usize = 10;
const PACING_MS: u64 = 400;

const MARKER: &str = "XSSTEST__MARKER__12345";

enum ReflectionContext {
    TextOnly,
    HtmlElement,
    ScriptBlock,
    EventHandler,
    Attribute,
}

static SCRIPT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<script[^>]*>[^<]*{MARKER}")).unwrap()
});
static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r#"on\w+\s*=\s*"[^"]*{MARKER}"#)).unwrap());
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"(?:href|src)\s*=\s*"[^"]*{MARKER}"#)).unwrap()
});
static HTML_ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"<[a-zA-Z][^>]*>[^<]*{MARKER}")).unwrap());

fn classify(body: &str) -> ReflectionContext {
    if !body.contains(MARKER) {
        return ReflectionContext::TextOnly;
    }
    if SCRIPT_BLOCK_RE.is_match(body) {
        ReflectionContext::ScriptBlock
    } else if EVENT_HANDLER_RE.is_match(body) {
        ReflectionContext::EventHandler
    } else if ATTRIBUTE_RE.is_match(body) {
        ReflectionContext::Attribute
    } else if HTML_ELEMENT_RE.is_match(body) {
        ReflectionContext::HtmlElement
    } else {
        ReflectionContext::TextOnly
    }
}

/// Probes up to [`MAX_URLS`] candidate URLs for reflected XSS by injecting
/// `xss_test=<marker>` and inspecting where the marker reappears. Emits at
/// most one finding per URL, and only for a dangerous reflection context.
pub async fn probe(scan_id: Uuid, client: &reqwest::Client, candidate_urls: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut paced = Paced::new(PACING_MS);

    for url in candidate_urls.iter().take(MAX_URLS) {
        paced.wait().await;
        let Ok(mut parsed) = Url::parse(url) else {
            continue;
        };
        parsed.query_pairs_mut().append_pair("xss_test", MARKER);

        let Ok(resp) = client
            .get(parsed.as_str())
            .timeout(Duration::from_secs(10))
            .send()
            .await
        else {
            continue;
        };
        let Ok(body) = resp.text().await else {
            continue;
        };

        let (rule_id, confidence_note) = match classify(&body) {
            ReflectionContext::TextOnly => continue,
            ReflectionContext::ScriptBlock | ReflectionContext::EventHandler | ReflectionContext::Attribute => {
                ("WSS-XSS-002", "script/attribute context")
            }
            ReflectionContext::HtmlElement => ("WSS-XSS-001", "HTML-element context"),
        };

        if let Ok(finding) = new_finding(
            scan_id,
            rule_id,
            url.clone(),
            format!("reflected marker in {confidence_note}"),
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
    fn reflection_inside_an_element_is_html_element_context() {
        let body = format!("<p>search results for {MARKER}</p>");
        assert!(matches!(classify(&body), ReflectionContext::HtmlElement));
    }

    #[test]
    fn script_block_reflection_is_detected() {
        let body = format!("<script>var x = '{MARKER}';</script>");
        assert!(matches!(classify(&body), ReflectionContext::ScriptBlock));
    }

    #[test]
    fn event_handler_reflection_is_detected() {
        let body = format!(r#"<div onclick="go('{MARKER}')"></div>"#);
        assert!(matches!(classify(&body), ReflectionContext::EventHandler));
    }

    #[test]
    fn no_marker_is_text_only() {
        let body = "<p>nothing here</p>";
        assert!(matches!(classify(body), ReflectionContext::TextOnly));
    }
}
