/// Server configuration loaded from environment variables. Scan behaviour
/// (crawler limits, concurrency, persistence path) lives in
/// `webscan_orchestrator::OrchestratorConfig::from_env`; this struct only
/// covers the fronting HTTP layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("WEBSCAN_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("WEBSCAN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            cors_origins: std::env::var("WEBSCAN_CORS_ORIGINS")
                .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["http://localhost:3000".into()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        // Relies on these WEBSCAN_* keys being unset in the test environment.
        let config = ServerConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }
}
