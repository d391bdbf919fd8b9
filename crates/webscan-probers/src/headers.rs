//! Security-header analyser (§4.6.5). Runs a fixed checklist against the
//! target's top-level response headers (and, for the cross-origin script
//! check, its HTML body), producing one [`SecurityTest`] per check.

use reqwest::header::HeaderMap;
use uuid::Uuid;
use webscan_core::{SecurityTest, TestResult};

pub fn analyse(
    scan_id: Uuid,
    headers: &HeaderMap,
    is_https: bool,
    html_body: Option<&str>,
) -> Vec<SecurityTest> {
    vec![
        csp_presence(scan_id, headers),
        hsts(scan_id, headers, is_https),
        x_frame_options(scan_id, headers),
        x_content_type_options(scan_id, headers),
        referrer_policy(scan_id, headers),
        cors(scan_id, headers),
        permissions_policy(scan_id, headers),
        spectre_mitigation(scan_id, headers),
        cross_origin_scripts(scan_id, html_body),
    ]
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn csp_presence(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    match header_str(headers, "content-security-policy") {
        Some(_) => SecurityTest::new(
            scan_id, "Content-Security-Policy header present", true, 5, TestResult::Passed,
            "CSP header present", "Continue enforcing a restrictive CSP.",
        ),
        None => SecurityTest::new(
            scan_id, "Content-Security-Policy header present", false, -25, TestResult::Failed,
            "no Content-Security-Policy header", "Add a restrictive Content-Security-Policy header.",
        ),
    }
}

fn hsts(scan_id: Uuid, headers: &HeaderMap, is_https: bool) -> SecurityTest {
    if !is_https {
        return SecurityTest::new(
            scan_id, "HTTP Strict Transport Security", true, 0, TestResult::NotApplicable,
            "target is not https", "N/A for non-HTTPS targets.",
        );
    }
    match header_str(headers, "strict-transport-security") {
        Some(value) => {
            let max_age = value
                .split(';')
                .find_map(|p| p.trim().strip_prefix("max-age="))
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            const SIX_MONTHS_SECONDS: u64 = 60 * 60 * 24 * 30 * 6;
            if max_age >= SIX_MONTHS_SECONDS {
                SecurityTest::new(
                    scan_id, "HSTS max-age", true, 5, TestResult::Passed,
                    "HSTS present with max-age >= 6 months", "Continue enforcing HSTS.",
                )
            } else {
                SecurityTest::new(
                    scan_id, "HSTS max-age", false, -10, TestResult::Failed,
                    "HSTS present but max-age is under 6 months", "Raise HSTS max-age to at least 15552000.",
                )
            }
        }
        None => SecurityTest::new(
            scan_id, "HSTS max-age", false, -20, TestResult::Failed,
            "no Strict-Transport-Security header", "Add Strict-Transport-Security with max-age >= 6 months.",
        ),
    }
}

fn x_frame_options(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    match header_str(headers, "x-frame-options").map(|v| v.to_uppercase()) {
        Some(v) if v == "DENY" || v == "SAMEORIGIN" => SecurityTest::new(
            scan_id, "X-Frame-Options", true, 5, TestResult::Passed,
            "X-Frame-Options restricts framing", "Continue restricting framing.",
        ),
        _ => SecurityTest::new(
            scan_id, "X-Frame-Options", false, -20, TestResult::Failed,
            "X-Frame-Options missing or permissive", "Set X-Frame-Options to DENY or SAMEORIGIN.",
        ),
    }
}

fn x_content_type_options(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    match header_str(headers, "x-content-type-options").map(|v| v.to_lowercase()) {
        Some(v) if v == "nosniff" => SecurityTest::new(
            scan_id, "X-Content-Type-Options", true, 0, TestResult::Passed,
            "nosniff set", "Continue setting nosniff.",
        ),
        _ => SecurityTest::new(
            scan_id, "X-Content-Type-Options", false, -5, TestResult::Failed,
            "X-Content-Type-Options missing", "Set X-Content-Type-Options: nosniff.",
        ),
    }
}

fn referrer_policy(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    const STRONG: &[&str] = &["no-referrer", "strict-origin", "strict-origin-when-cross-origin", "same-origin"];
    match header_str(headers, "referrer-policy").map(|v| v.to_lowercase()) {
        Some(v) if STRONG.contains(&v.as_str()) => SecurityTest::new(
            scan_id, "Referrer-Policy", true, 5, TestResult::Passed,
            "strong Referrer-Policy set", "Continue restricting referrer leakage.",
        ),
        _ => SecurityTest::new(
            scan_id, "Referrer-Policy", false, 0, TestResult::Info,
            "Referrer-Policy missing or weak", "Set Referrer-Policy to strict-origin-when-cross-origin.",
        ),
    }
}

fn cors(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    let origin = header_str(headers, "access-control-allow-origin");
    let credentials = header_str(headers, "access-control-allow-credentials")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    match origin {
        Some("*") if credentials => SecurityTest::new(
            scan_id, "CORS policy", false, -25, TestResult::Failed,
            "wildcard CORS origin combined with credentials", "Never combine Access-Control-Allow-Origin: * with credentials.",
        ),
        Some("*") => SecurityTest::new(
            scan_id, "CORS policy", false, -10, TestResult::Failed,
            "wildcard CORS origin", "Restrict Access-Control-Allow-Origin to known origins.",
        ),
        _ => SecurityTest::new(
            scan_id, "CORS policy", true, 5, TestResult::Passed,
            "no permissive CORS policy detected", "Continue restricting CORS to known origins.",
        ),
    }
}

fn permissions_policy(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    const SENSITIVE: &[&str] = &["camera", "microphone", "geolocation", "payment", "usb"];
    match header_str(headers, "permissions-policy") {
        None => SecurityTest::new(
            scan_id, "Permissions-Policy", false, -5, TestResult::Failed,
            "Permissions-Policy missing", "Add a Permissions-Policy restricting sensitive features.",
        ),
        Some(value) => {
            let has_wildcard = SENSITIVE
                .iter()
                .any(|feature| value.contains(&format!("{feature}=*")));
            if has_wildcard {
                SecurityTest::new(
                    scan_id, "Permissions-Policy", false, -10, TestResult::Failed,
                    "Permissions-Policy grants a sensitive feature via wildcard", "Restrict sensitive features to specific origins or none.",
                )
            } else {
                SecurityTest::new(
                    scan_id, "Permissions-Policy", true, 5, TestResult::Passed,
                    "Permissions-Policy restricts sensitive features", "Continue restricting sensitive features.",
                )
            }
        }
    }
}

fn spectre_mitigation(scan_id: Uuid, headers: &HeaderMap) -> SecurityTest {
    let coop = header_str(headers, "cross-origin-opener-policy")
        .map(|v| v == "same-origin")
        .unwrap_or(false);
    let coep = header_str(headers, "cross-origin-embedder-policy")
        .map(|v| v == "require-corp" || v == "credentialless")
        .unwrap_or(false);
    if coop && coep {
        SecurityTest::new(
            scan_id, "Spectre mitigation (COOP/COEP)", true, 5, TestResult::Passed,
            "COOP and COEP both set to strong values", "Continue isolating the browsing context.",
        )
    } else {
        SecurityTest::new(
            scan_id, "Spectre mitigation (COOP/COEP)", false, -5, TestResult::Failed,
            "COOP/COEP missing or weak", "Set Cross-Origin-Opener-Policy: same-origin and Cross-Origin-Embedder-Policy: require-corp.",
        )
    }
}

fn cross_origin_scripts(scan_id: Uuid, html_body: Option<&str>) -> SecurityTest {
    let Some(body) = html_body else {
        return SecurityTest::new(
            scan_id, "Cross-origin script sources", true, 5, TestResult::Passed,
            "no HTML body to scan", "N/A without an HTML body.",
        );
    };
    let external_count = count_external_scripts(body);
    if external_count == 0 {
        SecurityTest::new(
            scan_id, "Cross-origin script sources", true, 5, TestResult::Passed,
            "no external script sources found", "Continue avoiding unnecessary third-party scripts.",
        )
    } else {
        SecurityTest::new(
            scan_id, "Cross-origin script sources", false, -10 * external_count as i32, TestResult::Failed,
            format!("{external_count} external script source(s) found"),
            "Audit and minimise third-party script dependencies; pin with SRI.",
        )
    }
}

fn count_external_scripts(body: &str) -> usize {
    let document = scraper::Html::parse_document(body);
    let Ok(selector) = scraper::Selector::parse("script[src]") else {
        return 0;
    };
    document
        .select(&selector)
        .filter(|el| {
            el.value()
                .attr("src")
                .map(|src| src.starts_with("http://") || src.starts_with("https://"))
                .unwrap_or(false)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn missing_csp_fails_with_expected_contribution() {
        let headers = HeaderMap::new();
        let test = csp_presence(Uuid::new_v4(), &headers);
        assert!(!test.passed);
        assert_eq!(test.score_contribution, -25);
    }

    #[test]
    fn hsts_short_max_age_is_partial_failure() {
        let mut headers = HeaderMap::new();
        headers.insert("strict-transport-security", HeaderValue::from_static("max-age=3600"));
        let test = hsts(Uuid::new_v4(), &headers, true);
        assert_eq!(test.score_contribution, -10);
    }

    #[test]
    fn hsts_long_max_age_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("strict-transport-security", HeaderValue::from_static("max-age=31536000"));
        let test = hsts(Uuid::new_v4(), &headers, true);
        assert!(test.passed);
        assert_eq!(test.score_contribution, 5);
    }

    #[test]
    fn cors_wildcard_with_credentials_is_critical() {
        let mut headers = HeaderMap::new();
        headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
        let test = cors(Uuid::new_v4(), &headers);
        assert_eq!(test.score_contribution, -25);
    }

    #[test]
    fn cors_wildcard_alone_is_high_not_critical() {
        let mut headers = HeaderMap::new();
        headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        let test = cors(Uuid::new_v4(), &headers);
        assert_eq!(test.score_contribution, -10);
    }

    #[test]
    fn external_script_scan_counts_cdn_sources() {
        let body = r#"<html><body><script src="https://cdn.example.com/a.js"></script><script src="/local.js"></script></body></html>"#;
        assert_eq!(count_external_scripts(body), 1);
    }
}
