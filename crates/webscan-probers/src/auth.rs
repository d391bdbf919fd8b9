//! Authentication Engine (§4.6.9). Performs a single login attempt against a
//! configured form, captures the resulting session cookies, and then probes
//! a handful of nominally-protected pages for broken access control.
//!
//! There is no headless-browser crate grounded anywhere in the example
//! pack, so [`BrowserContext`] is a small capability trait implemented here
//! over a plain [`reqwest::Client`] rather than a real DOM/JS runtime — it
//! can follow redirects, submit forms, and read cookies, which covers every
//! auth-engine operation this module performs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webscan_core::{new_finding, Finding, WebscanError, WebscanResult};

use crate::cookies;
use crate::pacing::Paced;

const BYPASS_PACING_MS: u64 = 500;
const BYPASS_PARAMS: &[&str] = &["admin", "authenticated", "auth", "user", "role", "debug", "bypass"];

/// Credentials and targets for a single authenticated-scan attempt.
/// Never logged or persisted; held only for the duration of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub login_url: String,
    pub username_field: String,
    pub password_field: String,
    pub username: String,
    pub password: String,
    /// Pages expected to require authentication; probed for access-control
    /// weaknesses once a session is established.
    pub protected_urls: Vec<String>,
}

impl AuthConfig {
    pub fn validate(&self) -> WebscanResult<()> {
        if self.login_url.trim().is_empty() {
            return Err(WebscanError::Auth("login_url must not be empty".into()));
        }
        if self.username.trim().is_empty() || self.password.trim().is_empty() {
            return Err(WebscanError::Auth("username and password must not be empty".into()));
        }
        if self.protected_urls.is_empty() {
            return Err(WebscanError::Auth("at least one protected_url is required".into()));
        }
        Ok(())
    }
}

/// Minimal browser-capability surface the auth engine needs. Implemented
/// here over `reqwest`; a real DOM-driving implementation could swap in
/// behind the same trait without touching the probing logic below.
#[async_trait]
pub trait BrowserContext: Send {
    async fn goto(&mut self, url: &str) -> WebscanResult<String>;
    async fn fill(&mut self, field: &str, value: &str) -> WebscanResult<()>;
    async fn submit(&mut self, form_url: &str) -> WebscanResult<u16>;
    fn cookies(&self) -> Vec<String>;
    async fn close(&mut self);
}

/// `reqwest`-backed [`BrowserContext`]. `fill` buffers form fields client
/// side; `submit` issues the actual POST with the buffered fields and the
/// cookie jar's accumulated state.
pub struct ReqwestBrowserContext {
    client: reqwest::Client,
    fields: Vec<(String, String)>,
    last_cookies: Vec<String>,
}

impl ReqwestBrowserContext {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, fields: Vec::new(), last_cookies: Vec::new() }
    }
}

#[async_trait]
impl BrowserContext for ReqwestBrowserContext {
    async fn goto(&mut self, url: &str) -> WebscanResult<String> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        capture_set_cookie(&resp, &mut self.last_cookies);
        Ok(resp.text().await?)
    }

    async fn fill(&mut self, field: &str, value: &str) -> WebscanResult<()> {
        self.fields.push((field.to_string(), value.to_string()));
        Ok(())
    }

    async fn submit(&mut self, form_url: &str) -> WebscanResult<u16> {
        let resp = self
            .client
            .post(form_url)
            .form(&self.fields)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        capture_set_cookie(&resp, &mut self.last_cookies);
        let status = resp.status().as_u16();
        self.fields.clear();
        Ok(status)
    }

    fn cookies(&self) -> Vec<String> {
        self.last_cookies.clone()
    }

    async fn close(&mut self) {
        self.fields.clear();
    }
}

fn capture_set_cookie(resp: &reqwest::Response, into: &mut Vec<String>) {
    for value in resp.headers().get_all(reqwest::header::SET_COOKIE) {
        if let Ok(s) = value.to_str() {
            into.push(s.to_string());
        }
    }
}

/// Runs a single login attempt (no retries), then the three access-control
/// bypass tests from §4.6.9 against every configured protected URL. The
/// browser context is closed on every exit path, including early returns on
/// login/validation failure.
pub async fn run(
    scan_id: Uuid,
    config: &AuthConfig,
    mut ctx: impl BrowserContext,
    client: &reqwest::Client,
) -> WebscanResult<Vec<Finding>> {
    config.validate()?;

    let login_result = attempt_login(&config, &mut ctx).await;
    let session_cookies = ctx.cookies();
    ctx.close().await;

    let Ok(()) = login_result else {
        return Err(WebscanError::Auth("login attempt failed".into()));
    };

    let mut findings = cookies::analyse(
        scan_id,
        &config.login_url,
        &session_cookies,
        config.login_url.starts_with("https://"),
    );

    findings.extend(probe_unauthenticated_access(scan_id, client, &config.protected_urls).await);
    findings.extend(probe_tampered_session(scan_id, client, &config.protected_urls, &session_cookies).await);
    findings.extend(probe_parameter_bypass(scan_id, client, &config.protected_urls).await);

    Ok(findings)
}

async fn attempt_login(config: &AuthConfig, ctx: &mut impl BrowserContext) -> WebscanResult<()> {
    ctx.goto(&config.login_url).await?;
    ctx.fill(&config.username_field, &config.username).await?;
    ctx.fill(&config.password_field, &config.password).await?;
    let status = ctx.submit(&config.login_url).await?;
    if status >= 400 {
        return Err(WebscanError::Auth(format!("login endpoint returned {status}")));
    }
    Ok(())
}

/// The markers a final URL path is checked against to decide whether an
/// unauthenticated request landed on a login page rather than the protected
/// resource itself (the client follows redirects, so a 302-to-login shows up
/// here as a 200 on the login page's own URL).
const LOGIN_PATH_MARKERS: &[&str] = &["login", "signin", "sign-in", "auth"];

fn looks_like_login_url(url: &url::Url) -> bool {
    let path = url.path().to_lowercase();
    LOGIN_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

/// WSS-AUTH-005: a protected page reachable with no session at all.
/// Per §4.6 step 7a this requires HTTP 200 *and* no redirect to a
/// login-like URL — the default client follows redirects, so a 302-to-login
/// would otherwise read as a success on the protected resource.
async fn probe_unauthenticated_access(
    scan_id: Uuid,
    client: &reqwest::Client,
    protected_urls: &[String],
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for url in protected_urls {
        let Ok(resp) = client.get(url).timeout(Duration::from_secs(10)).send().await else {
            continue;
        };
        if resp.status().is_success() && !looks_like_login_url(resp.url()) {
            if let Ok(finding) = new_finding(
                scan_id,
                "WSS-AUTH-005",
                url.clone(),
                format!("protected resource returned {} with no session", resp.status().as_u16()),
                None,
            ) {
                findings.push(finding);
            }
        }
    }
    findings
}

/// WSS-AUTH-006: a tampered copy of the session cookie still grants access.
async fn probe_tampered_session(
    scan_id: Uuid,
    client: &reqwest::Client,
    protected_urls: &[String],
    session_cookies: &[String],
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let Some(original) = session_cookies.first() else { return findings };
    let tampered = tamper_cookie(original);

    for url in protected_urls {
        let Ok(resp) = client
            .get(url)
            .header(reqwest::header::COOKIE, &tampered)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        else {
            continue;
        };
        if resp.status().is_success() {
            if let Ok(finding) = new_finding(
                scan_id,
                "WSS-AUTH-006",
                url.clone(),
                "protected resource accepted a tampered session cookie",
                None,
            ) {
                findings.push(finding);
            }
        }
    }
    findings
}

fn tamper_cookie(raw: &str) -> String {
    let Some((name, value)) = raw.split(';').next().and_then(|kv| kv.split_once('=')) else {
        return raw.to_string();
    };
    format!("{name}={value}TAMPERED")
}

/// WSS-AUTH-007: a request-parameter claiming elevated access is honoured.
async fn probe_parameter_bypass(
    scan_id: Uuid,
    client: &reqwest::Client,
    protected_urls: &[String],
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut paced = Paced::new(BYPASS_PACING_MS);

    'urls: for url in protected_urls {
        let Ok(parsed) = url::Url::parse(url) else { continue };
        for param in BYPASS_PARAMS {
            paced.wait().await;
            let mut bypassed = parsed.clone();
            bypassed.query_pairs_mut().append_pair(param, "true");

            let Ok(resp) = client
                .get(bypassed.as_str())
                .timeout(Duration::from_secs(10))
                .send()
                .await
            else {
                continue;
            };
            if resp.status().is_success() {
                if let Ok(finding) = new_finding(
                    scan_id,
                    "WSS-AUTH-007",
                    url.clone(),
                    format!("unauthenticated request with {param}=true was granted access"),
                    None,
                ) {
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
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct FakeBrowser {
        visited: Arc<Mutex<Vec<String>>>,
        fields: Arc<Mutex<Vec<(String, String)>>>,
        submit_status: u16,
        cookies: Vec<String>,
    }

    #[async_trait]
    impl BrowserContext for FakeBrowser {
        async fn goto(&mut self, url: &str) -> WebscanResult<String> {
            self.visited.lock().unwrap().push(url.to_string());
            Ok(String::new())
        }
        async fn fill(&mut self, field: &str, value: &str) -> WebscanResult<()> {
            self.fields.lock().unwrap().push((field.to_string(), value.to_string()));
            Ok(())
        }
        async fn submit(&mut self, _form_url: &str) -> WebscanResult<u16> {
            Ok(self.submit_status)
        }
        fn cookies(&self) -> Vec<String> {
            self.cookies.clone()
        }
        async fn close(&mut self) {}
    }

    fn sample_config() -> AuthConfig {
        AuthConfig {
            login_url: "https://example.com/login".to_string(),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            username: "tester".to_string(),
            password: "hunter2".to_string(),
            protected_urls: vec!["https://example.com/admin".to_string()],
        }
    }

    #[test]
    fn validate_rejects_empty_protected_urls() {
        let mut config = sample_config();
        config.protected_urls.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn tamper_cookie_mutates_the_value_only() {
        let tampered = tamper_cookie("session_id=abcdef; Path=/");
        assert_eq!(tampered, "session_id=abcdefTAMPERED");
    }

    #[tokio::test]
    async fn login_attempt_visits_and_fills_expected_fields() {
        let config = sample_config();
        let mut browser = FakeBrowser { submit_status: 200, ..Default::default() };
        attempt_login(&config, &mut browser).await.unwrap();
        assert_eq!(browser.visited.lock().unwrap().as_slice(), [config.login_url.clone()]);
        assert_eq!(browser.fields.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn login_attempt_fails_on_4xx_status_with_no_retry() {
        let config = sample_config();
        let mut browser = FakeBrowser { submit_status: 401, ..Default::default() };
        assert!(attempt_login(&config, &mut browser).await.is_err());
    }

    #[test]
    fn login_like_paths_are_recognised() {
        assert!(looks_like_login_url(&url::Url::parse("https://h/login").unwrap()));
        assert!(looks_like_login_url(&url::Url::parse("https://h/account/sign-in").unwrap()));
        assert!(!looks_like_login_url(&url::Url::parse("https://h/admin").unwrap()));
    }

    #[tokio::test]
    async fn unauthenticated_redirect_to_login_is_not_flagged_as_bypass() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("GET", "/admin")
            .with_status(302)
            .with_header("location", "/login")
            .create_async()
            .await;
        let _login = server.mock("GET", "/login").with_status(200).create_async().await;

        let client = reqwest::Client::new();
        let findings = probe_unauthenticated_access(
            Uuid::new_v4(),
            &client,
            &[format!("{}/admin", server.url())],
        )
        .await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_direct_200_is_flagged_as_bypass() {
        let mut server = mockito::Server::new_async().await;
        let _admin = server.mock("GET", "/admin").with_status(200).create_async().await;

        let client = reqwest::Client::new();
        let findings = probe_unauthenticated_access(
            Uuid::new_v4(),
            &client,
            &[format!("{}/admin", server.url())],
        )
        .await;
        assert!(findings.iter().any(|f| f.rule_id == "WSS-AUTH-005"));
    }
}
