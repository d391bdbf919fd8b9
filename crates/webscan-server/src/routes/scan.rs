//! Scan lifecycle endpoints (§6): `POST /scan/start`, `GET /scan/{id}/status`,
//! `GET /scan/{id}/results`, `GET /scan/logs`, `GET /history/{hostname}`.
//! Grounded on a `create_scan`/`get_scan`/`scan_progress_ws`-shaped handler
//! set, rewritten against `webscan_orchestrator::Orchestrator` and re-shaped
//! to the response bodies §6 specifies.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webscan_core::{Confidence, Finding, Grade, RiskBand, Scan, ScanMode, ScanPhase, ScanStatus, SecurityTest, Severity, TestResult};
use webscan_crawler::CrawlerConfig;
use webscan_orchestrator::StartRequest;
use webscan_probers::auth::AuthConfig;

use crate::error::AppError;
use crate::routes::AppState;

/// `POST /scan/start` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanRequest {
    pub target_url: String,
    pub mode: ScanMode,
    pub auth_config: Option<AuthConfig>,
    pub crawler_options: Option<CrawlerConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlInfoBody {
    pub protocol: &'static str,
    pub redirected: bool,
    pub warnings: Vec<String>,
    pub security_threats: Vec<FindingBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub scan_id: Uuid,
    pub status: ScanStatus,
    pub url_info: UrlInfoBody,
}

/// `POST /scan/start` (§6). Rejects `authConfig` paired with `mode=STATIC`
/// (409, the auth engine only ever runs during the dynamic phase).
/// Normalisation failure surfaces as 400 and creates no scan.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(body): Json<StartScanRequest>,
) -> Result<(axum::http::StatusCode, Json<StartScanResponse>), AppError> {
    if body.auth_config.is_some() && matches!(body.mode, ScanMode::Static) {
        return Err(AppError::Conflict("authConfig is not valid with mode=STATIC".into()));
    }

    let outcome = state
        .orchestrator
        .start(StartRequest {
            target_url: body.target_url,
            mode: body.mode,
            auth_config: body.auth_config,
            crawler_options: body.crawler_options,
        })
        .await
        .map_err(|e| match e {
            webscan_orchestrator::OrchestratorError::Webscan(inner) => AppError::BadRequest(inner.to_string()),
            other => AppError::from(other),
        })?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(StartScanResponse {
            scan_id: outcome.scan_id,
            status: ScanStatus::Pending,
            url_info: UrlInfoBody {
                protocol: outcome.url_info.protocol,
                redirected: outcome.url_info.redirected,
                warnings: outcome.url_info.warnings,
                security_threats: outcome.url_info.security_threats.into_iter().map(FindingBody::from).collect(),
            },
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: ScanStatus,
    pub phase: Option<ScanPhase>,
}

/// `GET /scan/{id}/status` (§6).
pub async fn get_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let id = parse_scan_id(&id)?;
    let view = state.orchestrator.status(id).await?;
    Ok(Json(StatusResponse { status: view.status, phase: view.phase }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingBody {
    pub id: Uuid,
    pub rule_id: String,
    pub finding_type: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub description: String,
    pub location: String,
    pub remediation: String,
    pub owasp_category: String,
    pub subtype: Option<String>,
    pub evidence: String,
}

impl From<Finding> for FindingBody {
    fn from(f: Finding) -> Self {
        FindingBody {
            id: f.id,
            rule_id: f.rule_id,
            finding_type: f.finding_type,
            severity: f.severity,
            confidence: f.confidence,
            description: f.description,
            location: f.location,
            remediation: f.remediation,
            owasp_category: f.owasp_category,
            subtype: f.subtype,
            evidence: f.evidence,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityTestBody {
    pub id: Uuid,
    pub name: String,
    pub passed: bool,
    pub score_contribution: i32,
    pub result: TestResult,
    pub reason: String,
    pub recommendation: String,
    pub details: serde_json::Value,
}

impl From<SecurityTest> for SecurityTestBody {
    fn from(t: SecurityTest) -> Self {
        SecurityTestBody {
            id: t.id,
            name: t.name,
            passed: t.passed,
            score_contribution: t.score_contribution,
            result: t.result,
            reason: t.reason,
            recommendation: t.recommendation,
            details: t.details,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    pub id: Uuid,
    pub target_url: String,
    pub hostname: String,
    pub mode: ScanMode,
    pub status: ScanStatus,
    pub score: Option<i32>,
    pub grade: Option<Grade>,
    pub risk_band: Option<RiskBand>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub summary: serde_json::Value,
}

impl From<Scan> for ScanBody {
    fn from(s: Scan) -> Self {
        ScanBody {
            id: s.id,
            target_url: s.target_url,
            hostname: s.hostname,
            mode: s.mode,
            status: s.status,
            score: s.score,
            grade: s.grade,
            risk_band: s.risk_band,
            created_at: s.created_at,
            completed_at: s.completed_at,
            summary: s.summary,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub scan: ScanBody,
    pub findings: Vec<FindingBody>,
    pub tests: Vec<SecurityTestBody>,
}

/// `GET /scan/{id}/results` (§6). 409 if the scan has not reached a
/// terminal state, via `OrchestratorError::NotReady`'s `From<_> for AppError`.
pub async fn get_results(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ResultsResponse>, AppError> {
    let id = parse_scan_id(&id)?;
    let view = state.orchestrator.results(id).await?;
    Ok(Json(ResultsResponse {
        scan: view.scan.into(),
        findings: view.findings.into_iter().map(FindingBody::from).collect(),
        tests: view.tests.into_iter().map(SecurityTestBody::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(rename = "scanId")]
    pub scan_id: String,
}

/// `GET /scan/logs?scanId=...` (§6): a server-initiated stream of log
/// events, open until the scan terminates or the client disconnects.
/// Each event's `data:` payload is the JSON-encoded `LogEvent`.
pub async fn stream_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let scan_id = parse_scan_id(&query.scan_id)?;
    let mut subscription = state
        .orchestrator
        .log_bus()
        .subscribe(scan_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no active scan with id {scan_id}")))?;

    let stream = async_stream::stream! {
        while let Some(event) = subscription.recv().await {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(level_name(event.level)).data(payload));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn level_name(level: webscan_core::LogLevel) -> &'static str {
    match level {
        webscan_core::LogLevel::Info => "info",
        webscan_core::LogLevel::Success => "success",
        webscan_core::LogLevel::Warning => "warning",
        webscan_core::LogLevel::Error => "error",
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// `GET /history/{hostname}` (§6): the most recent scans for a hostname,
/// newest first, capped at 20.
pub async fn get_history(
    State(state): State<AppState>,
    AxumPath(hostname): AxumPath<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ScanBody>>, AppError> {
    let limit = query.limit.unwrap_or(20).min(20);
    let scans = state.orchestrator.history(&hostname, limit).await?;
    Ok(Json(scans.into_iter().map(ScanBody::from).collect()))
}

fn parse_scan_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid scan id: {raw}")))
}
