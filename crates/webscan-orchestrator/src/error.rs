use uuid::Uuid;
use webscan_core::WebscanError;

/// Orchestrator-level error taxonomy. Distinct from [`WebscanError`] because
/// the two outcomes below are routing concerns (404 / 409 at the HTTP
/// layer, per §6) rather than scan-execution failures.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no scan with id {0}")]
    NotFound(Uuid),
    #[error("scan {0} has not reached a terminal state")]
    NotReady(Uuid),
    #[error(transparent)]
    Webscan(#[from] WebscanError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
