//! SQL-error prober (§4.6.2).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use url::Url;
use uuid::Uuid;
use webscan_core::{new_finding, Finding, Severity};

use crate::pacing::Paced;

const MAX_URLS: usize = 10;
const PACING_MS: u64 = 500;

const PAYLOADS: &[&str] = &["'", "'--", "' UNION SELECT NULL--", "\" OR \"1\"=\"1", "'; DROP TABLE x;--"];

static ERROR_SIGNATURES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)you have an error in your sql syntax|warning: mysql|unclosed quotation mark|pg_query\(\)|postgresql.*error|ora-\d{5}|microsoft ole db provider|sqlite3?\.(?:operationalerror|programmingerror)|sql syntax.*error|unterminated quoted string",
    )
    .unwrap()
});

/// Candidate URLs are those with query parameters or a trailing numeric
/// path segment; the caller is expected to have already filtered for this.
pub async fn probe(scan_id: Uuid, client: &reqwest::Client, candidate_urls: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut paced = Paced::new(PACING_MS);

    'urls: for url in candidate_urls.iter().take(MAX_URLS) {
        let Ok(parsed) = Url::parse(url) else { continue };
        let Some((first_param, _)) = parsed.query_pairs().next() else {
            continue;
        };
        let first_param = first_param.into_owned();

        for payload in PAYLOADS {
            paced.wait().await;
            let mut injected = parsed.clone();
            {
                let mut pairs: Vec<(String, String)> = injected
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                for (k, v) in pairs.iter_mut() {
                    if *k == first_param {
                        *v = payload.to_string();
                    }
                }
                let query = pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&");
                injected.set_query(Some(&query));
            }

            let Ok(resp) = client
                .get(injected.as_str())
                .timeout(Duration::from_secs(10))
                .send()
                .await
            else {
                continue;
            };
            let status = resp.status();
            let Ok(body) = resp.text().await else { continue };

            if ERROR_SIGNATURES.is_match(&body) {
                let severity = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    Severity::High
                } else {
                    Severity::Medium
                };
                if let Ok(mut finding) = new_finding(
                    scan_id,
                    "WSS-SQLI-001",
                    url.clone(),
                    format!("payload {payload:?} triggered a database error signature"),
                    None,
                ) {
                    finding.severity = severity;
                    findings.push(finding);
                }
                continue 'urls;
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_signature_matches() {
        assert!(ERROR_SIGNATURES.is_match("You have an error in your SQL syntax near..."));
    }

    #[test]
    fn postgres_signature_matches() {
        assert!(ERROR_SIGNATURES.is_match("PostgreSQL. ERROR: syntax error at or near"));
    }

    #[test]
    fn oracle_signature_matches() {
        assert!(ERROR_SIGNATURES.is_match("ORA-00933: SQL command not properly ended"));
    }

    #[test]
    fn non_error_body_does_not_match() {
        assert!(!ERROR_SIGNATURES.is_match("<html><body>Welcome</body></html>"));
    }
}
