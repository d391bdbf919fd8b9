//! Dynamic Probers (§4.6): non-destructive runtime checks over crawler
//! output, plus the Authentication Engine (§4.6.9).
//!
//! Every prober in this crate shares the invariants listed in §4.6: GET/HEAD
//! only (state-changing POSTs only to crawler-discovered forms with passive
//! marker payloads), its own pacing delay, a cap on URLs/forms exercised,
//! and marker-based rather than exploitative payloads.

pub mod auth;
pub mod cookies;
pub mod csp;
pub mod csrf;
pub mod exception;
pub mod headers;
pub mod pacing;
pub mod path;
pub mod sqli;
pub mod xss;

pub use pacing::Paced;
