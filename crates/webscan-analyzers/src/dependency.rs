//! Dependency manifest analyser (§4.5.3). Expects a `package.json`-shaped
//! manifest with `dependencies`/`devDependencies` maps of name -> version
//! range string; direct and dev dependencies are flattened together.

use std::collections::HashMap;
use std::sync::LazyLock;

use semver::{Version, VersionReq};
use uuid::Uuid;
use webscan_core::{new_finding, Finding, Severity};

struct Advisory {
    package: &'static str,
    affected_range: &'static str,
    severity: Severity,
    advisory_url: &'static str,
    patched_version: &'static str,
}

/// A small static advisory set, in the spirit of §4.5.3's "static advisory
/// set keyed by name". A real deployment would refresh this from an OSV/NVD
/// feed; this engine treats it as immutable data like the rule registry.
static ADVISORIES: LazyLock<Vec<Advisory>> = LazyLock::new(|| {
    vec![
        Advisory {
            package: "lodash",
            affected_range: "<4.17.21",
            severity: Severity::High,
            advisory_url: "https://github.com/advisories/GHSA-35jh-r3h4-6jhm",
            patched_version: "4.17.21",
        },
        Advisory {
            package: "minimist",
            affected_range: "<1.2.6",
            severity: Severity::Medium,
            advisory_url: "https://github.com/advisories/GHSA-xvch-5gv4-984h",
            patched_version: "1.2.6",
        },
        Advisory {
            package: "express",
            affected_range: "<4.17.3",
            severity: Severity::Medium,
            advisory_url: "https://github.com/advisories/GHSA-rv95-896h-c2vc",
            patched_version: "4.17.3",
        },
        Advisory {
            package: "node-fetch",
            affected_range: "<2.6.7",
            severity: Severity::High,
            advisory_url: "https://github.com/advisories/GHSA-r683-j2x4-v87g",
            patched_version: "2.6.7",
        },
    ]
});

/// Parses a manifest and checks every flattened dependency against the
/// advisory set. Unparseable manifests produce a single `WSS-DEP-002`
/// finding rather than aborting the scan.
pub fn analyse(scan_id: Uuid, manifest_json: &str) -> Vec<Finding> {
    let parsed: serde_json::Value = match serde_json::from_str(manifest_json) {
        Ok(v) => v,
        Err(e) => {
            return new_finding(
                scan_id,
                "WSS-DEP-002",
                "manifest",
                e.to_string(),
                None,
            )
            .into_iter()
            .collect();
        }
    };

    let mut deps: HashMap<String, String> = HashMap::new();
    for key in ["dependencies", "devDependencies"] {
        if let Some(obj) = parsed.get(key).and_then(|v| v.as_object()) {
            for (name, version) in obj {
                if let Some(version) = version.as_str() {
                    deps.insert(name.clone(), version.to_string());
                }
            }
        }
    }

    let mut findings = Vec::new();
    for (name, range_spec) in &deps {
        let Some(version) = parse_loose_version(range_spec) else {
            continue;
        };
        for advisory in ADVISORIES.iter().filter(|a| a.package == name) {
            let Ok(req) = VersionReq::parse(advisory.affected_range) else {
                continue;
            };
            if req.matches(&version) {
                let evidence = format!(
                    "{name}@{range_spec} matches {} (patched: {})",
                    advisory.affected_range, advisory.patched_version
                );
                if let Ok(mut finding) = new_finding(
                    scan_id,
                    "WSS-DEP-001",
                    format!("dependencies.{name}"),
                    &evidence,
                    None,
                ) {
                    finding.severity = advisory.severity;
                    finding.remediation = format!(
                        "Upgrade {name} to {} or later. See {}",
                        advisory.patched_version, advisory.advisory_url
                    );
                    findings.push(finding);
                }
            }
        }
    }
    findings
}

/// Strips common range prefixes (`^`, `~`, `>=`, etc.) to recover a concrete
/// version for matching. Manifests pin exact install versions in a
/// lockfile in practice; here we take the manifest's stated floor.
fn parse_loose_version(range_spec: &str) -> Option<Version> {
    let trimmed = range_spec.trim_start_matches(['^', '~', '=', '>', '<', ' ']);
    Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulnerable_lodash_version_is_flagged() {
        let manifest = r#"{"dependencies": {"lodash": "4.17.15"}}"#;
        let findings = analyse(Uuid::new_v4(), manifest);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-DEP-001"));
    }

    #[test]
    fn patched_lodash_version_is_not_flagged() {
        let manifest = r#"{"dependencies": {"lodash": "4.17.21"}}"#;
        let findings = analyse(Uuid::new_v4(), manifest);
        assert!(findings.is_empty());
    }

    #[test]
    fn dev_dependencies_are_flattened_in() {
        let manifest = r#"{"devDependencies": {"minimist": "1.2.0"}}"#;
        let findings = analyse(Uuid::new_v4(), manifest);
        assert!(findings.iter().any(|f| f.rule_id == "WSS-DEP-001"));
    }

    #[test]
    fn unparseable_manifest_emits_parse_failure_finding_only() {
        let findings = analyse(Uuid::new_v4(), "not json at all {{{");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "WSS-DEP-002");
    }

    #[test]
    fn unknown_package_is_ignored() {
        let manifest = r#"{"dependencies": {"totally-unknown-pkg": "1.0.0"}}"#;
        assert!(analyse(Uuid::new_v4(), manifest).is_empty());
    }
}
