//! CSRF-token prober (§4.6.4): exercises forms discovered by the crawler,
//! distinct from the static HTML analyser's check over the target's own
//! page body (§4.5.2) — this prober follows the crawl graph.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use uuid::Uuid;
use webscan_core::{new_finding, Finding};
use webscan_crawler::DiscoveredForm;

use crate::pacing::Paced;

const MAX_FORMS: usize = 3;
const PACING_MS: u64 = 300;
const STATE_CHANGING_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

static HIDDEN_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<input[^>]*type=["']?hidden["']?[^>]*name=["']?([\w\-]*(?:csrf|xsrf|authenticity_token|anti[_-]?forgery|__requestverificationtoken|csrfmiddlewaretoken|token)[\w\-]*)["']?[^>]*value=["']([^"']{16,})["']"#,
    )
    .unwrap()
});
static META_CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta[^>]*name=["'][^"']*(?:csrf|xsrf)[^"']*["']"#).unwrap());

/// For each state-changing form (capped at [`MAX_FORMS`]), fetches the
/// owning page and looks for a CSRF-like hidden input or meta tag.
pub async fn probe(scan_id: Uuid, client: &reqwest::Client, forms: &[DiscoveredForm]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut paced = Paced::new(PACING_MS);

    let state_changing: Vec<&DiscoveredForm> = forms
        .iter()
        .filter(|f| STATE_CHANGING_METHODS.contains(&f.method.as_str()))
        .take(MAX_FORMS)
        .collect();

    for form in state_changing {
        paced.wait().await;
        let Ok(resp) = client
            .get(&form.page_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        else {
            continue;
        };
        let Ok(body) = resp.text().await else { continue };

        if !has_csrf_token(&body) {
            if let Ok(finding) = new_finding(
                scan_id,
                "WSS-CSRF-001",
                form.page_url.clone(),
                format!("form action={} method={} has no csrf-like token", form.action, form.method),
                None,
            ) {
                findings.push(finding);
            }
        }
    }

    findings
}

fn has_csrf_token(body: &str) -> bool {
    HIDDEN_TOKEN_RE.is_match(body) || META_CSRF_RE.is_match(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_input_with_long_value_is_recognised() {
        let body = r#"<input type="hidden" name="csrf_token" value="abcdefghijklmnop0123">"#;
        assert!(has_csrf_token(body));
    }

    #[test]
    fn short_token_value_is_not_recognised() {
        let body = r#"<input type="hidden" name="csrf_token" value="short">"#;
        assert!(!has_csrf_token(body));
    }

    #[test]
    fn meta_csrf_tag_is_recognised() {
        let body = r#"<meta name="csrf-token" content="abc">"#;
        assert!(has_csrf_token(body));
    }

    #[test]
    fn form_with_no_token_at_all() {
        assert!(!has_csrf_token("<form method=\"POST\"></form>"));
    }
}
