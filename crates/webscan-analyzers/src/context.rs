//! Context-aware confidence adjuster (§4.5.1, §9): a pure function
//! `adjust(baseConfidence, ctx) -> confidence`, idempotent by construction.

use webscan_core::Confidence;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisContext {
    pub is_framework: bool,
    pub is_minified: bool,
    pub has_csp: bool,
    /// True when the matched rule is in the eval/Function family; only
    /// these get the additional CSP-based downgrade.
    pub is_eval_family: bool,
}

/// Downgrades HIGH to MEDIUM when the source looks like framework or
/// minified code; further downgrades eval/Function-family matches to LOW
/// when a CSP without `unsafe-eval` is present. Severity is never touched.
/// Idempotent: re-applying to an already-adjusted confidence is a no-op.
pub fn adjust_confidence(base: Confidence, ctx: AnalysisContext) -> Confidence {
    let mut confidence = base;
    if ctx.is_framework || ctx.is_minified {
        confidence = match confidence {
            Confidence::High => Confidence::Medium,
            other => other,
        };
    }
    if ctx.has_csp && ctx.is_eval_family {
        confidence = match confidence {
            Confidence::High | Confidence::Medium => Confidence::Low,
            Confidence::Low => Confidence::Low,
        };
    }
    confidence
}
