pub mod health;
pub mod scan;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::config::ServerConfig;
use crate::middleware::{same_origin_middleware, security_headers_middleware};
use webscan_orchestrator::Orchestrator;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: ServerConfig,
}

/// Build the complete router (§6): scan lifecycle endpoints plus `/health`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/scan/start", post(scan::start_scan))
        .route("/scan/{id}/status", get(scan::get_status))
        .route("/scan/{id}/results", get(scan::get_results))
        .route("/scan/logs", get(scan::stream_logs))
        .route("/history/{hostname}", get(scan::get_history))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(same_origin_middleware))
        .with_state(state)
}
