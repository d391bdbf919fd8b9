use std::path::PathBuf;

use webscan_crawler::CrawlerConfig;

/// Orchestrator-wide configuration loaded from environment variables,
/// following the same `WEBSCAN_*`-prefixed convention as the fronting
/// server's own config.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub db_path: PathBuf,
    pub max_concurrent_scans: usize,
    /// Per-scan wall-clock deadline (§5); default 300000ms.
    pub scan_timeout_ms: u64,
    pub crawler: CrawlerConfig,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("WEBSCAN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("webscan.db")),
            max_concurrent_scans: std::env::var("WEBSCAN_MAX_CONCURRENT_SCANS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            scan_timeout_ms: std::env::var("WEBSCAN_SCAN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300_000),
            crawler: CrawlerConfig {
                max_depth: std::env::var("WEBSCAN_MAX_DEPTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
                max_pages: std::env::var("WEBSCAN_MAX_PAGES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(50),
                rate_limit_ms: std::env::var("WEBSCAN_RATE_LIMIT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
                respect_robots_txt: std::env::var("WEBSCAN_RESPECT_ROBOTS_TXT")
                    .map(|v| v != "0" && v.to_lowercase() != "false")
                    .unwrap_or(true),
                allow_external_links: std::env::var("WEBSCAN_ALLOW_EXTERNAL_LINKS")
                    .map(|v| v == "1" || v.to_lowercase() == "true")
                    .unwrap_or(false),
                timeout_ms: std::env::var("WEBSCAN_REQUEST_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10_000),
                session_credentials: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_when_env_unset() {
        // Relies on these WEBSCAN_* keys being unset in the test environment,
        // matching a fresh process's default configuration.
        let config = OrchestratorConfig::from_env();
        assert_eq!(config.max_concurrent_scans, 5);
        assert_eq!(config.scan_timeout_ms, 300_000);
        assert_eq!(config.crawler.max_depth, 2);
    }
}
