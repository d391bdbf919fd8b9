use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use webscan_orchestrator::{Orchestrator, OrchestratorConfig, ScanStore};
use webscan_server::config::ServerConfig;
use webscan_server::routes::{build_router, AppState};

pub const ORIGIN: &str = "http://localhost:3000";

/// Build a test app backed by a temp-dir SQLite store, mirroring the
/// binary's own wiring in `main.rs`.
pub fn test_app() -> (Router, TempDir) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp.path().join("test.db");

    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        cors_origins: vec![ORIGIN.into()],
    };

    let mut orchestrator_config = OrchestratorConfig::from_env();
    orchestrator_config.db_path = db_path.clone();

    let store = ScanStore::open(&db_path).expect("failed to open test store");
    let orchestrator = Orchestrator::new(store, orchestrator_config);

    let app = build_router(AppState { orchestrator, config });
    (app, tmp)
}

/// Build a same-origin GET (Origin header matching Host).
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .header(header::HOST, "localhost:3000")
        .body(Body::empty())
        .unwrap()
}

/// Build a GET carrying no Origin/Host match — used to exercise same-origin
/// rejection on sensitive paths.
pub fn get_cross_origin(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::ORIGIN, "http://evil.example")
        .header(header::HOST, "localhost:3000")
        .body(Body::empty())
        .unwrap()
}

/// Build a same-origin POST with a JSON body.
pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .header(header::HOST, "localhost:3000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Build a cross-origin POST — exercises the same-origin rejection path.
pub fn post_json_cross_origin(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::ORIGIN, "http://evil.example")
        .header(header::HOST, "localhost:3000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
