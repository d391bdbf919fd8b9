//! Scan Orchestrator (§4.8): state machine, SQLite persistence, and the
//! concurrency/cancellation model (§5) tying the crawler, static analysers,
//! dynamic probers, and score engine into one scan lifecycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

pub use config::OrchestratorConfig;
pub use engine::{Orchestrator, ResultsView, StartOutcome, StartRequest, StatusView, UrlInfo};
pub use error::{OrchestratorError, OrchestratorResult};
pub use store::ScanStore;
