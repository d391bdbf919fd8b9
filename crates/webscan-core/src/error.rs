//! Abstract error taxonomy (§7). These are the seven kinds the orchestrator
//! and its collaborators raise; only [`WebscanError::RuleError`] and
//! [`WebscanError::OrchestratorFatal`] terminate a scan with FAILED — every
//! other variant is recovered as locally as possible by its caller.

use thiserror::Error;

pub type WebscanResult<T> = Result<T, WebscanError>;

#[derive(Debug, Error)]
pub enum WebscanError {
    /// Invalid or unreachable target. Surfaced to the caller; no scan is created.
    #[error("normalisation failed: {0}")]
    Normalisation(String),

    /// Transient HTTP failure inside the crawler or a prober. Logged, never fatal.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Malformed HTML/manifest/CSP. Logged; the analyser emits no finding for the input.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Prober-internal failure. Logged as `error`; the prober terminates cleanly.
    #[error("prober {prober} failed: {message}")]
    Prober { prober: String, message: String },

    /// Authentication flow failed. Recorded as info/warning; the scan continues
    /// unauthenticated.
    #[error("auth failed: {0}")]
    Auth(String),

    /// Unknown rule ID referenced by `newFinding`. A programming bug; aborts
    /// the scan with FAILED.
    #[error("unknown rule id: {0}")]
    UnknownRule(String),

    /// Persistence failure, unfetchable seed URL, or deadline exceeded.
    /// Transitions the scan to FAILED.
    #[error("orchestrator fatal: {0}")]
    OrchestratorFatal(String),
}

impl WebscanError {
    /// True for the two kinds that terminate a scan with FAILED (§7 Propagation).
    pub fn is_scan_fatal(&self) -> bool {
        matches!(
            self,
            WebscanError::UnknownRule(_) | WebscanError::OrchestratorFatal(_)
        )
    }
}

impl From<rusqlite::Error> for WebscanError {
    fn from(err: rusqlite::Error) -> Self {
        WebscanError::OrchestratorFatal(err.to_string())
    }
}

impl From<reqwest::Error> for WebscanError {
    fn from(err: reqwest::Error) -> Self {
        WebscanError::Fetch(err.to_string())
    }
}

impl From<url::ParseError> for WebscanError {
    fn from(err: url::ParseError) -> Self {
        WebscanError::Normalisation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rule_and_orchestrator_errors_are_scan_fatal() {
        assert!(WebscanError::UnknownRule("WSS-XSS-999".into()).is_scan_fatal());
        assert!(WebscanError::OrchestratorFatal("disk full".into()).is_scan_fatal());
        assert!(!WebscanError::Fetch("timeout".into()).is_scan_fatal());
        assert!(!WebscanError::Parse("bad html".into()).is_scan_fatal());
        assert!(!WebscanError::Auth("bad creds".into()).is_scan_fatal());
        assert!(!WebscanError::Prober {
            prober: "xss".into(),
            message: "panic".into()
        }
        .is_scan_fatal());
    }
}
