//! Scan Orchestrator (§4.8): the state machine, phase dispatcher, and
//! concurrency/cancellation model (§5). Grounded on the fronting server's
//! `create_scan` handler — background `tokio::spawn` dispatch, a semaphore
//! bounding concurrent scans, terminal signalling over a broadcast channel —
//! generalised from a single-kind scan dispatch to the full static/dynamic
//! phase pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;
use webscan_core::{
    Finding, LogBus, LogEvent, LogLevel, LogPhase, Scan, ScanMode, ScanPhase, ScanStatus,
    SecurityTest, TestResult,
};
use webscan_crawler::CrawlerConfig;
use webscan_net::{NormaliseOptions, Protocol};
use webscan_probers::auth::{AuthConfig, ReqwestBrowserContext};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::store::ScanStore;

/// `start(request)` input (§4.8 Operations).
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub target_url: String,
    pub mode: ScanMode,
    pub auth_config: Option<AuthConfig>,
    pub crawler_options: Option<CrawlerConfig>,
}

/// `urlInfo` half of the `POST /scan/start` response (§6).
#[derive(Debug, Clone)]
pub struct UrlInfo {
    pub protocol: &'static str,
    pub redirected: bool,
    pub warnings: Vec<String>,
    pub security_threats: Vec<Finding>,
}

/// `start(request)` output: the new scan id plus the normaliser's
/// observations, both needed by the `POST /scan/start` response (§6).
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub scan_id: Uuid,
    pub url_info: UrlInfo,
}

#[derive(Debug, Clone)]
pub struct StatusView {
    pub status: ScanStatus,
    pub phase: Option<ScanPhase>,
}

#[derive(Debug, Clone)]
pub struct ResultsView {
    pub scan: Scan,
    pub findings: Vec<Finding>,
    pub tests: Vec<SecurityTest>,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: ScanStore,
    log_bus: LogBus,
    semaphore: Arc<Semaphore>,
    client: reqwest::Client,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: ScanStore, config: OrchestratorConfig) -> Self {
        Orchestrator {
            store,
            log_bus: LogBus::new(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_scans)),
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn log_bus(&self) -> &LogBus {
        &self.log_bus
    }

    /// Normalises the URL, inserts a PENDING scan row, and dispatches
    /// execution onto a background task. Returns immediately with the new
    /// scan id. Normalisation failure is returned synchronously and no
    /// scan row is created (§4.8).
    pub async fn start(&self, request: StartRequest) -> OrchestratorResult<StartOutcome> {
        let scan_id = Uuid::new_v4();
        let normalised = webscan_net::normalise(
            &request.target_url,
            NormaliseOptions::default(),
            scan_id,
        )
        .await
        .map_err(OrchestratorError::Webscan)?;

        let hostname = url::Url::parse(&normalised.final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let protocol = if matches!(normalised.protocol, Protocol::Https) { "https" } else { "http" };

        let mut scan = Scan::new(normalised.final_url.clone(), hostname, request.mode);
        scan.id = scan_id;
        scan.summary = serde_json::json!({
            "protocol": protocol,
            "redirected": normalised.redirected,
            "warnings": normalised.warnings,
        });

        self.store.insert_pending(&scan).map_err(OrchestratorError::Webscan)?;
        self.log_bus.create_channel(scan_id).await;

        let url_info = UrlInfo {
            protocol,
            redirected: normalised.redirected,
            warnings: normalised.warnings,
            security_threats: normalised.security_threats,
        };

        let orchestrator = self.clone();
        let crawler_options = request.crawler_options.unwrap_or_else(|| self.config.crawler.clone());
        let auth_config = request.auth_config;
        let seed_findings = url_info.security_threats.clone();

        tokio::spawn(async move {
            orchestrator.run_to_completion(scan, crawler_options, auth_config, seed_findings).await;
        });

        Ok(StartOutcome { scan_id, url_info })
    }

    pub async fn status(&self, id: Uuid) -> OrchestratorResult<StatusView> {
        let scan = self.store.get_scan(id).map_err(OrchestratorError::Webscan)?.ok_or(OrchestratorError::NotFound(id))?;
        Ok(StatusView { status: scan.status, phase: scan.phase })
    }

    pub async fn results(&self, id: Uuid) -> OrchestratorResult<ResultsView> {
        let scan = self.store.get_scan(id).map_err(OrchestratorError::Webscan)?.ok_or(OrchestratorError::NotFound(id))?;
        if !scan.status.is_terminal() {
            return Err(OrchestratorError::NotReady(id));
        }
        let findings = self.store.get_findings(id).map_err(OrchestratorError::Webscan)?;
        let tests = self.store.get_tests(id).map_err(OrchestratorError::Webscan)?;
        Ok(ResultsView { scan, findings, tests })
    }

    pub async fn history(&self, hostname: &str, limit: usize) -> OrchestratorResult<Vec<Scan>> {
        self.store.history(hostname, limit).map_err(OrchestratorError::Webscan)
    }

    /// Bounds the whole run by the semaphore (max concurrent scans) and the
    /// per-scan deadline (§5). Any error at this level is an
    /// orchestrator-fatal failure and transitions the scan to FAILED.
    async fn run_to_completion(
        &self,
        scan: Scan,
        crawler_options: CrawlerConfig,
        auth_config: Option<AuthConfig>,
        seed_findings: Vec<Finding>,
    ) {
        let scan_id = scan.id;
        let Ok(_permit) = self.semaphore.acquire().await else {
            let _ = self.store.fail(scan_id, "orchestrator shutting down");
            return;
        };

        let deadline = Duration::from_millis(self.config.scan_timeout_ms);
        match tokio::time::timeout(deadline, self.execute(scan, crawler_options, auth_config, seed_findings)).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                self.publish(scan_id, LogLevel::Error, format!("scan failed: {reason}"), None).await;
                let _ = self.store.fail(scan_id, &reason);
            }
            Err(_) => {
                self.publish(scan_id, LogLevel::Error, "scan exceeded its deadline", None).await;
                let _ = self.store.fail(scan_id, "scan exceeded its deadline");
            }
        }

        self.log_bus.remove_channel(scan_id).await;
    }

    /// The execution pipeline itself (§4.8 steps 1-5). Prober-level
    /// failures are isolated and logged, never surfaced as an `Err` here;
    /// only persistence/normalisation/crawler-seed failures propagate.
    async fn execute(
        &self,
        mut scan: Scan,
        crawler_options: CrawlerConfig,
        auth_config: Option<AuthConfig>,
        seed_findings: Vec<Finding>,
    ) -> Result<(), String> {
        self.store.mark_running(scan.id, ScanPhase::Static).map_err(|e| e.to_string())?;
        self.publish(scan.id, LogLevel::Info, "scan started", Some(LogPhase::Static)).await;

        let mut findings = seed_findings;
        let mut tests = Vec::new();

        if scan.mode.runs_static() {
            self.run_static_phase(&scan, &mut findings, &mut tests).await;
        }

        if scan.mode.runs_dynamic() {
            self.store.set_phase(scan.id, ScanPhase::Dynamic).map_err(|e| e.to_string())?;
            self.run_dynamic_phase(&scan, crawler_options, auth_config, &mut findings, &mut tests).await?;
        }

        self.publish(scan.id, LogLevel::Info, "computing score", Some(LogPhase::Score)).await;
        let score = webscan_score::compute_score(&tests);
        scan.complete_with_score(score.score);
        scan.summary["owaspCoverage"] = serde_json::to_value(webscan_score::summarize_owasp_coverage(&findings))
            .unwrap_or(serde_json::Value::Null);

        self.store.complete(&scan, &findings, &tests).map_err(|e| e.to_string())?;
        self.publish(scan.id, LogLevel::Success, "scan completed", None).await;
        Ok(())
    }

    async fn run_static_phase(&self, scan: &Scan, findings: &mut Vec<Finding>, tests: &mut Vec<SecurityTest>) {
        let Ok(resp) = self.client.get(&scan.target_url).send().await else {
            self.publish(scan.id, LogLevel::Error, "failed to fetch target for static analysis", Some(LogPhase::Static)).await;
            tests.push(SecurityTest::new(
                scan.id, "Static Analysis", false, 0, TestResult::NotApplicable,
                "could not fetch target for static analysis", "Verify the target is reachable and retry the scan.",
            ));
            return;
        };
        let is_https = scan.target_url.starts_with("https://");
        let has_csp = resp.headers().contains_key("content-security-policy");
        let Ok(body) = resp.text().await else {
            tests.push(SecurityTest::new(
                scan.id, "Static Analysis", false, 0, TestResult::NotApplicable,
                "could not read target response body", "Verify the target is reachable and retry the scan.",
            ));
            return;
        };

        let mut static_findings = webscan_analyzers::html::analyse(scan.id, &body, is_https);

        for (i, script) in extract_inline_scripts(&body).into_iter().enumerate() {
            static_findings.extend(webscan_analyzers::js::analyse(scan.id, &script, &format!("inline-script-{i}.js"), has_csp));
        }

        if let Some(manifest) = self.fetch_manifest(&scan.target_url).await {
            static_findings.extend(webscan_analyzers::dependency::analyse(scan.id, &manifest));
        }

        tests.push(SecurityTest::new(
            scan.id, "Static Analysis", true, 0, TestResult::Info,
            format!("static analysis completed with {} finding(s)", static_findings.len()),
            "Review static findings for remediation priority.",
        ));
        findings.extend(static_findings);
    }

    /// Looks for a `package.json` at the target's origin. Absence or any
    /// fetch failure is silently skipped (§4.8 step 2: "skipped when
    /// unreachable"), not a scan-level error.
    async fn fetch_manifest(&self, target_url: &str) -> Option<String> {
        let origin = url::Url::parse(target_url).ok()?;
        let manifest_url = origin.join("/package.json").ok()?;
        let resp = self.client.get(manifest_url.as_str()).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }

    async fn run_dynamic_phase(
        &self,
        scan: &Scan,
        crawler_options: CrawlerConfig,
        auth_config: Option<AuthConfig>,
        findings: &mut Vec<Finding>,
        tests: &mut Vec<SecurityTest>,
    ) -> Result<(), String> {
        if let Some(auth_config) = auth_config {
            self.store.set_phase(scan.id, ScanPhase::Auth).map_err(|e| e.to_string())?;
            self.publish(scan.id, LogLevel::Info, "running authentication engine", Some(LogPhase::Auth)).await;
            match webscan_probers::auth::run(scan.id, &auth_config, ReqwestBrowserContext::new(self.client.clone()), &self.client).await {
                Ok(mut auth_findings) => {
                    findings.append(&mut auth_findings);
                    tests.push(SecurityTest::new(
                        scan.id, "Authentication", true, 0, TestResult::Passed,
                        "authentication engine completed a session login", "Continue verifying session handling on a schedule.",
                    ));
                }
                Err(e) => {
                    self.publish(scan.id, LogLevel::Warning, format!("auth engine failed: {e}"), Some(LogPhase::Auth)).await;
                    tests.push(SecurityTest::new(
                        scan.id, "Authentication", false, 0, TestResult::NotApplicable,
                        e.to_string(), "Verify the login selectors and credentials; the scan continued unauthenticated.",
                    ));
                }
            }
        }

        self.store.set_phase(scan.id, ScanPhase::Crawl).map_err(|e| e.to_string())?;
        self.publish(scan.id, LogLevel::Info, "crawling target", Some(LogPhase::Crawl)).await;
        let crawl = webscan_crawler::crawl(&scan.target_url, &crawler_options)
            .await
            .map_err(|e| format!("crawler seed failure: {e}"))?;

        self.store.set_phase(scan.id, ScanPhase::Dynamic).map_err(|e| e.to_string())?;

        let is_https = scan.target_url.starts_with("https://");
        let resp = self.client.get(&scan.target_url).send().await.ok();
        let headers = resp.as_ref().map(|r| r.headers().clone());
        let cookie_headers: Vec<String> = headers
            .as_ref()
            .map(|h| {
                h.get_all(reqwest::header::SET_COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(headers) = &headers {
            tests.extend(webscan_probers::headers::analyse(scan.id, headers, is_https, None));
            if let Some(csp) = headers.get("content-security-policy").and_then(|v| v.to_str().ok()) {
                tests.extend(webscan_probers::csp::analyse(scan.id, csp));
            }
        }
        findings.extend(webscan_probers::cookies::analyse(scan.id, &scan.target_url, &cookie_headers, is_https));

        if let Some(resp) = resp {
            let status = resp.status().as_u16();
            if let Ok(body) = resp.text().await {
                findings.extend(webscan_probers::exception::analyse(scan.id, &scan.target_url, status, &body));
            }
        }

        // Each prober paces its own requests independently (`Paced`), so the
        // four run as concurrent futures rather than one after another.
        let (xss, sqli, path, csrf) = futures::join!(
            webscan_probers::xss::probe(scan.id, &self.client, &crawl.urls),
            webscan_probers::sqli::probe(scan.id, &self.client, &crawl.urls),
            webscan_probers::path::probe(scan.id, &self.client, &crawl.urls),
            webscan_probers::csrf::probe(scan.id, &self.client, &crawl.forms),
        );
        findings.extend(xss);
        findings.extend(sqli);
        findings.extend(path);
        findings.extend(csrf);

        Ok(())
    }

    /// Publishes to the scan-facing Log Bus and, at the same site, emits the
    /// matching operator-facing `tracing` event — the two channels carry the
    /// same facts to different audiences and must never drift apart.
    async fn publish(&self, scan_id: Uuid, level: LogLevel, message: impl Into<String>, phase: Option<LogPhase>) {
        let mut event = LogEvent::new(scan_id, level, message);
        if let Some(phase) = phase {
            event = event.with_phase(phase);
        }
        match event.level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(scan_id = %event.scan_id, phase = ?event.phase, "{}", event.message)
            }
            LogLevel::Warning => {
                tracing::warn!(scan_id = %event.scan_id, phase = ?event.phase, "{}", event.message)
            }
            LogLevel::Error => {
                tracing::error!(scan_id = %event.scan_id, phase = ?event.phase, "{}", event.message)
            }
        }
        self.log_bus.publish(event).await;
    }
}

fn extract_inline_scripts(body: &str) -> Vec<String> {
    let document = scraper::Html::parse_document(body);
    let Ok(selector) = scraper::Selector::parse("script:not([src])") else {
        return Vec::new();
    };
    document.select(&selector).map(|el| el.text().collect::<String>()).collect()
}
