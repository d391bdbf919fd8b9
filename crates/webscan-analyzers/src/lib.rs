//! Static Analysers (§4.5): JS/TS, HTML, and dependency-manifest analysers.
//! Each shares the shape `analyse(source, filename, hasCSP?) -> Finding[]`.

pub mod context;
pub mod dependency;
pub mod html;
pub mod js;

pub use context::{adjust_confidence, AnalysisContext};
