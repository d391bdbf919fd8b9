use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use webscan_orchestrator::{Orchestrator, OrchestratorConfig, ScanStore};
use webscan_server::config::ServerConfig;
use webscan_server::middleware::cors_layer;
use webscan_server::routes::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();

    tracing::info!(
        "starting webscan server v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.host,
        config.port
    );

    let store = ScanStore::open(&orchestrator_config.db_path).expect("failed to open scan store");
    tracing::info!("scan store opened at {}", orchestrator_config.db_path.display());

    let orchestrator = Orchestrator::new(store, orchestrator_config);
    let state = AppState { orchestrator, config: config.clone() };

    let app = build_router(state).layer(cors_layer(&config.cors_origins));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid bind address");

    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
