//! OWASP Top 10:2025 category labels and the legacy 2021 -> 2025 remapping
//! table from §4.7. `remap` is idempotent: remapping an already-2025 label
//! returns it unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwaspCategory {
    #[serde(rename = "A01:2025")]
    A01,
    #[serde(rename = "A02:2025")]
    A02,
    #[serde(rename = "A03:2025")]
    A03,
    #[serde(rename = "A04:2025")]
    A04,
    #[serde(rename = "A05:2025")]
    A05,
    #[serde(rename = "A06:2025")]
    A06,
    #[serde(rename = "A07:2025")]
    A07,
    #[serde(rename = "A08:2025")]
    A08,
    #[serde(rename = "A09:2025")]
    A09,
    #[serde(rename = "A10:2025")]
    A10,
}

impl OwaspCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            OwaspCategory::A01 => "A01:2025",
            OwaspCategory::A02 => "A02:2025",
            OwaspCategory::A03 => "A03:2025",
            OwaspCategory::A04 => "A04:2025",
            OwaspCategory::A05 => "A05:2025",
            OwaspCategory::A06 => "A06:2025",
            OwaspCategory::A07 => "A07:2025",
            OwaspCategory::A08 => "A08:2025",
            OwaspCategory::A09 => "A09:2025",
            OwaspCategory::A10 => "A10:2025",
        }
    }
}

impl fmt::Display for OwaspCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A legacy OWASP Top 10:2021 label, accepted at ingestion and remapped to
/// its 2025 counterpart per §4.7. `A10:2021` (SSRF) remaps to `A01:2025`
/// with subtype `"SSRF"` preserved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyOwaspCategory {
    A01_2021,
    A02_2021,
    A03_2021,
    A04_2021,
    A05_2021,
    A06_2021,
    A07_2021,
    A08_2021,
    A09_2021,
    A10_2021,
}

impl LegacyOwaspCategory {
    pub fn parse(label: &str) -> Option<LegacyOwaspCategory> {
        match label {
            "A01:2021" => Some(LegacyOwaspCategory::A01_2021),
            "A02:2021" => Some(LegacyOwaspCategory::A02_2021),
            "A03:2021" => Some(LegacyOwaspCategory::A03_2021),
            "A04:2021" => Some(LegacyOwaspCategory::A04_2021),
            "A05:2021" => Some(LegacyOwaspCategory::A05_2021),
            "A06:2021" => Some(LegacyOwaspCategory::A06_2021),
            "A07:2021" => Some(LegacyOwaspCategory::A07_2021),
            "A08:2021" => Some(LegacyOwaspCategory::A08_2021),
            "A09:2021" => Some(LegacyOwaspCategory::A09_2021),
            "A10:2021" => Some(LegacyOwaspCategory::A10_2021),
            _ => None,
        }
    }

    /// Maps to the 2025 category, plus a subtype when the remap introduces
    /// one (only `A10:2021` does, remapping to A01:2025/"SSRF").
    pub fn remap(self) -> (OwaspCategory, Option<&'static str>) {
        match self {
            LegacyOwaspCategory::A01_2021 => (OwaspCategory::A01, None),
            LegacyOwaspCategory::A02_2021 => (OwaspCategory::A04, None),
            LegacyOwaspCategory::A03_2021 => (OwaspCategory::A05, None),
            LegacyOwaspCategory::A04_2021 => (OwaspCategory::A06, None),
            LegacyOwaspCategory::A05_2021 => (OwaspCategory::A02, None),
            LegacyOwaspCategory::A06_2021 => (OwaspCategory::A03, None),
            LegacyOwaspCategory::A07_2021 => (OwaspCategory::A07, None),
            LegacyOwaspCategory::A08_2021 => (OwaspCategory::A08, None),
            LegacyOwaspCategory::A09_2021 => (OwaspCategory::A09, None),
            LegacyOwaspCategory::A10_2021 => (OwaspCategory::A01, Some("SSRF")),
        }
    }
}

/// Remaps an inbound category label (either already `A0*:2025` or a legacy
/// `A0*:2021`/`A10:2021` label) to its canonical 2025 form. Idempotent: a
/// label that is already `:2025` passes through unchanged with no subtype.
pub fn remap_owasp_label(label: &str) -> (OwaspCategory, Option<&'static str>) {
    if let Some(legacy) = LegacyOwaspCategory::parse(label) {
        return legacy.remap();
    }
    for cat in [
        OwaspCategory::A01,
        OwaspCategory::A02,
        OwaspCategory::A03,
        OwaspCategory::A04,
        OwaspCategory::A05,
        OwaspCategory::A06,
        OwaspCategory::A07,
        OwaspCategory::A08,
        OwaspCategory::A09,
        OwaspCategory::A10,
    ] {
        if cat.as_str() == label {
            return (cat, None);
        }
    }
    // Unknown labels are treated as the broadest bucket rather than panicking;
    // callers performing ingestion validation should reject before this point.
    (OwaspCategory::A01, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_table_matches_spec() {
        assert_eq!(remap_owasp_label("A01:2021").0, OwaspCategory::A01);
        assert_eq!(remap_owasp_label("A02:2021").0, OwaspCategory::A04);
        assert_eq!(remap_owasp_label("A03:2021").0, OwaspCategory::A05);
        assert_eq!(remap_owasp_label("A04:2021").0, OwaspCategory::A06);
        assert_eq!(remap_owasp_label("A05:2021").0, OwaspCategory::A02);
        assert_eq!(remap_owasp_label("A06:2021").0, OwaspCategory::A03);
        assert_eq!(remap_owasp_label("A07:2021").0, OwaspCategory::A07);
        assert_eq!(remap_owasp_label("A08:2021").0, OwaspCategory::A08);
        assert_eq!(remap_owasp_label("A09:2021").0, OwaspCategory::A09);
        let (cat, subtype) = remap_owasp_label("A10:2021");
        assert_eq!(cat, OwaspCategory::A01);
        assert_eq!(subtype, Some("SSRF"));
    }

    #[test]
    fn remap_is_idempotent() {
        for label in ["A01:2025", "A10:2025", "A04:2025"] {
            let (first, _) = remap_owasp_label(label);
            let (second, _) = remap_owasp_label(first.as_str());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn already_2025_label_passes_through() {
        let (cat, subtype) = remap_owasp_label("A07:2025");
        assert_eq!(cat, OwaspCategory::A07);
        assert_eq!(subtype, None);
    }
}
