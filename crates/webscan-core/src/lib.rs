//! Shared data model, error taxonomy, rule registry, OWASP taxonomy, and
//! log bus for the webscan engine. Every other crate in the workspace
//! depends on this one.

pub mod error;
pub mod logbus;
pub mod model;
pub mod owasp;
pub mod registry;

pub use error::{WebscanError, WebscanResult};
pub use logbus::{LogBus, LogEvent, LogLevel, LogPhase, Subscription};
pub use model::{
    Confidence, Finding, Grade, RiskBand, RuleDef, RuleFamily, Scan, ScanMode, ScanPhase,
    ScanStatus, SecurityTest, Severity, TestResult,
};
pub use owasp::{remap_owasp_label, LegacyOwaspCategory, OwaspCategory};
pub use registry::{get_rule, new_finding};
