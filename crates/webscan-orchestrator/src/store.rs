//! SQLite persistence for the Scan/Vulnerability/SecurityTest schema
//! (§3, §6). A single `Arc<Mutex<Connection>>` opened with WAL, migrated
//! with hand-rolled `CREATE TABLE IF NOT EXISTS` statements, cut to this
//! crate's own schema.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use webscan_core::{Finding, Scan, SecurityTest, WebscanError, WebscanResult};

/// Thread-safe handle shared across the orchestrator's background tasks.
#[derive(Clone)]
pub struct ScanStore {
    conn: Arc<Mutex<Connection>>,
}

fn to_col<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("model types are always serialisable")
}

fn from_col<T: DeserializeOwned>(raw: &str) -> WebscanResult<T> {
    serde_json::from_str(raw).map_err(|e| WebscanError::OrchestratorFatal(format!("corrupt stored column: {e}")))
}

impl ScanStore {
    /// Opens (creating if absent) the SQLite database and runs migrations.
    pub fn open(path: &Path) -> WebscanResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                target_url TEXT NOT NULL,
                hostname TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                phase TEXT,
                score INTEGER,
                grade TEXT,
                risk_band TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                summary TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);
            CREATE INDEX IF NOT EXISTS idx_scans_hostname_created ON scans(hostname, created_at DESC);

            CREATE TABLE IF NOT EXISTS vulnerabilities (
                id TEXT PRIMARY KEY,
                scan_id TEXT NOT NULL REFERENCES scans(id),
                rule_id TEXT NOT NULL,
                finding_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                confidence TEXT NOT NULL,
                description TEXT NOT NULL,
                location TEXT NOT NULL,
                remediation TEXT NOT NULL,
                owasp_category TEXT NOT NULL,
                subtype TEXT,
                evidence TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vuln_scan ON vulnerabilities(scan_id);
            CREATE INDEX IF NOT EXISTS idx_vuln_severity ON vulnerabilities(severity);

            CREATE TABLE IF NOT EXISTS security_tests (
                id TEXT PRIMARY KEY,
                scan_id TEXT NOT NULL REFERENCES scans(id),
                name TEXT NOT NULL,
                passed INTEGER NOT NULL,
                score_contribution INTEGER NOT NULL,
                result TEXT NOT NULL,
                reason TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tests_scan ON security_tests(scan_id);",
        )?;

        Ok(ScanStore { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests; same schema, no file on disk.
    #[cfg(test)]
    pub fn open_in_memory() -> WebscanResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE scans (
                id TEXT PRIMARY KEY, target_url TEXT NOT NULL, hostname TEXT NOT NULL,
                mode TEXT NOT NULL, status TEXT NOT NULL, phase TEXT, score INTEGER,
                grade TEXT, risk_band TEXT, created_at TEXT NOT NULL, completed_at TEXT,
                summary TEXT NOT NULL
            );
            CREATE TABLE vulnerabilities (
                id TEXT PRIMARY KEY, scan_id TEXT NOT NULL, rule_id TEXT NOT NULL,
                finding_type TEXT NOT NULL, severity TEXT NOT NULL, confidence TEXT NOT NULL,
                description TEXT NOT NULL, location TEXT NOT NULL, remediation TEXT NOT NULL,
                owasp_category TEXT NOT NULL, subtype TEXT, evidence TEXT NOT NULL
            );
            CREATE TABLE security_tests (
                id TEXT PRIMARY KEY, scan_id TEXT NOT NULL, name TEXT NOT NULL,
                passed INTEGER NOT NULL, score_contribution INTEGER NOT NULL, result TEXT NOT NULL,
                reason TEXT NOT NULL, recommendation TEXT NOT NULL, details TEXT NOT NULL
            );",
        )?;
        Ok(ScanStore { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn insert_pending(&self, scan: &Scan) -> WebscanResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scans (id, target_url, hostname, mode, status, phase, score, grade, risk_band, created_at, completed_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                scan.id.to_string(),
                scan.target_url,
                scan.hostname,
                to_col(&scan.mode),
                to_col(&scan.status),
                scan.phase.as_ref().map(to_col),
                scan.score,
                scan.grade.as_ref().map(to_col),
                scan.risk_band.as_ref().map(to_col),
                scan.created_at.to_rfc3339(),
                scan.completed_at.map(|t| t.to_rfc3339()),
                to_col(&scan.summary),
            ],
        )?;
        Ok(())
    }

    pub fn mark_running(&self, id: Uuid, phase: webscan_core::ScanPhase) -> WebscanResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scans SET status = ?1, phase = ?2 WHERE id = ?3",
            params![to_col(&webscan_core::ScanStatus::Running), to_col(&phase), id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_phase(&self, id: Uuid, phase: webscan_core::ScanPhase) -> WebscanResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE scans SET phase = ?1 WHERE id = ?2", params![to_col(&phase), id.to_string()])?;
        Ok(())
    }

    /// Single-transaction commit point (§5): status, findings, tests, and
    /// score/grade land atomically, or not at all.
    pub fn complete(&self, scan: &Scan, findings: &[Finding], tests: &[SecurityTest]) -> WebscanResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE scans SET status = ?1, phase = NULL, score = ?2, grade = ?3, risk_band = ?4, completed_at = ?5, summary = ?6 WHERE id = ?7",
            params![
                to_col(&scan.status),
                scan.score,
                scan.grade.as_ref().map(to_col),
                scan.risk_band.as_ref().map(to_col),
                scan.completed_at.map(|t| t.to_rfc3339()),
                to_col(&scan.summary),
                scan.id.to_string(),
            ],
        )?;

        for finding in findings {
            tx.execute(
                "INSERT INTO vulnerabilities (id, scan_id, rule_id, finding_type, severity, confidence, description, location, remediation, owasp_category, subtype, evidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    finding.id.to_string(),
                    finding.scan_id.to_string(),
                    finding.rule_id,
                    finding.finding_type,
                    to_col(&finding.severity),
                    to_col(&finding.confidence),
                    finding.description,
                    finding.location,
                    finding.remediation,
                    finding.owasp_category,
                    finding.subtype,
                    finding.evidence,
                ],
            )?;
        }

        for test in tests {
            tx.execute(
                "INSERT INTO security_tests (id, scan_id, name, passed, score_contribution, result, reason, recommendation, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    test.id.to_string(),
                    test.scan_id.to_string(),
                    test.name,
                    test.passed,
                    test.score_contribution,
                    to_col(&test.result),
                    test.reason,
                    test.recommendation,
                    to_col(&test.details),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn fail(&self, id: Uuid, reason: &str) -> WebscanResult<()> {
        let conn = self.conn.lock().unwrap();
        let summary = serde_json::json!({ "failureReason": reason });
        conn.execute(
            "UPDATE scans SET status = ?1, phase = NULL, completed_at = ?2, summary = ?3 WHERE id = ?4",
            params![
                to_col(&webscan_core::ScanStatus::Failed),
                Utc::now().to_rfc3339(),
                to_col(&summary),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get_scan(&self, id: Uuid) -> WebscanResult<Option<Scan>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, target_url, hostname, mode, status, phase, score, grade, risk_band, created_at, completed_at, summary FROM scans WHERE id = ?1",
            params![id.to_string()],
            row_to_scan,
        )
        .optional()
        .map_err(WebscanError::from)
        .and_then(|opt| opt.transpose())
    }

    pub fn get_findings(&self, scan_id: Uuid) -> WebscanResult<Vec<Finding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, rule_id, finding_type, severity, confidence, description, location, remediation, owasp_category, subtype, evidence FROM vulnerabilities WHERE scan_id = ?1",
        )?;
        let rows = stmt.query_map(params![scan_id.to_string()], row_to_finding)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    pub fn get_tests(&self, scan_id: Uuid) -> WebscanResult<Vec<SecurityTest>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, name, passed, score_contribution, result, reason, recommendation, details FROM security_tests WHERE scan_id = ?1",
        )?;
        let rows = stmt.query_map(params![scan_id.to_string()], row_to_test)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }

    /// `history(hostname, limit)`: most recent scans for `hostname`,
    /// newest first.
    pub fn history(&self, hostname: &str, limit: usize) -> WebscanResult<Vec<Scan>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_url, hostname, mode, status, phase, score, grade, risk_band, created_at, completed_at, summary
             FROM scans WHERE hostname = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![hostname, limit as i64], row_to_scan)?;
        rows.collect::<Result<Vec<_>, _>>()?.into_iter().collect()
    }
}

fn row_to_scan(row: &rusqlite::Row) -> rusqlite::Result<WebscanResult<Scan>> {
    let id: String = row.get(0)?;
    let target_url: String = row.get(1)?;
    let hostname: String = row.get(2)?;
    let mode: String = row.get(3)?;
    let status: String = row.get(4)?;
    let phase: Option<String> = row.get(5)?;
    let score: Option<i32> = row.get(6)?;
    let grade: Option<String> = row.get(7)?;
    let risk_band: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let completed_at: Option<String> = row.get(10)?;
    let summary: String = row.get(11)?;

    Ok((|| {
        Ok(Scan {
            id: Uuid::parse_str(&id).map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            target_url,
            hostname,
            mode: from_col(&mode)?,
            status: from_col(&status)?,
            phase: phase.map(|p| from_col(&p)).transpose()?,
            score,
            grade: grade.map(|g| from_col(&g)).transpose()?,
            risk_band: risk_band.map(|r| from_col(&r)).transpose()?,
            created_at: created_at.parse::<DateTime<Utc>>().map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            completed_at: completed_at
                .map(|t| t.parse::<DateTime<Utc>>())
                .transpose()
                .map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            summary: from_col(&summary)?,
        })
    })())
}

fn row_to_finding(row: &rusqlite::Row) -> rusqlite::Result<WebscanResult<Finding>> {
    let id: String = row.get(0)?;
    let scan_id: String = row.get(1)?;
    let rule_id: String = row.get(2)?;
    let finding_type: String = row.get(3)?;
    let severity: String = row.get(4)?;
    let confidence: String = row.get(5)?;
    let description: String = row.get(6)?;
    let location: String = row.get(7)?;
    let remediation: String = row.get(8)?;
    let owasp_category: String = row.get(9)?;
    let subtype: Option<String> = row.get(10)?;
    let evidence: String = row.get(11)?;

    Ok((|| {
        Ok(Finding {
            id: Uuid::parse_str(&id).map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            scan_id: Uuid::parse_str(&scan_id).map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            rule_id,
            finding_type,
            severity: from_col(&severity)?,
            confidence: from_col(&confidence)?,
            description,
            location,
            remediation,
            owasp_category,
            subtype,
            evidence,
        })
    })())
}

fn row_to_test(row: &rusqlite::Row) -> rusqlite::Result<WebscanResult<SecurityTest>> {
    let id: String = row.get(0)?;
    let scan_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let passed: bool = row.get(3)?;
    let score_contribution: i32 = row.get(4)?;
    let result: String = row.get(5)?;
    let reason: String = row.get(6)?;
    let recommendation: String = row.get(7)?;
    let details: String = row.get(8)?;

    Ok((|| {
        Ok(SecurityTest {
            id: Uuid::parse_str(&id).map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            scan_id: Uuid::parse_str(&scan_id).map_err(|e| WebscanError::OrchestratorFatal(e.to_string()))?,
            name,
            passed,
            score_contribution,
            result: from_col(&result)?,
            reason,
            recommendation,
            details: from_col(&details)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use webscan_core::{new_finding, ScanMode, SecurityTest as CoreSecurityTest, TestResult};

    #[test]
    fn round_trips_a_pending_scan() {
        let store = ScanStore::open_in_memory().unwrap();
        let scan = Scan::new("https://example.com/".into(), "example.com".into(), ScanMode::Both);
        store.insert_pending(&scan).unwrap();

        let fetched = store.get_scan(scan.id).unwrap().unwrap();
        assert_eq!(fetched.id, scan.id);
        assert_eq!(fetched.hostname, "example.com");
        assert!(matches!(fetched.status, webscan_core::ScanStatus::Pending));
    }

    #[test]
    fn complete_persists_findings_and_tests_atomically() {
        let store = ScanStore::open_in_memory().unwrap();
        let mut scan = Scan::new("https://example.com/".into(), "example.com".into(), ScanMode::Static);
        store.insert_pending(&scan).unwrap();
        scan.complete_with_score(62);

        let finding = new_finding(scan.id, "WSS-XSS-003", "a.js:1", "eval(x)", None).unwrap();
        let test = CoreSecurityTest::new(scan.id, "csp", false, -25, TestResult::Failed, "no csp", "add one");

        store.complete(&scan, &[finding], &[test]).unwrap();

        let fetched = store.get_scan(scan.id).unwrap().unwrap();
        assert_eq!(fetched.score, Some(62));
        assert_eq!(store.get_findings(scan.id).unwrap().len(), 1);
        assert_eq!(store.get_tests(scan.id).unwrap().len(), 1);
    }

    #[test]
    fn history_orders_newest_first_and_respects_limit() {
        let store = ScanStore::open_in_memory().unwrap();
        for _ in 0..3 {
            let scan = Scan::new("https://example.com/".into(), "example.com".into(), ScanMode::Static);
            store.insert_pending(&scan).unwrap();
        }
        let history = store.history("example.com", 2).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn fail_sets_terminal_state_with_null_score() {
        let store = ScanStore::open_in_memory().unwrap();
        let scan = Scan::new("https://example.com/".into(), "example.com".into(), ScanMode::Static);
        store.insert_pending(&scan).unwrap();
        store.fail(scan.id, "crawler seed unreachable").unwrap();

        let fetched = store.get_scan(scan.id).unwrap().unwrap();
        assert!(matches!(fetched.status, webscan_core::ScanStatus::Failed));
        assert!(fetched.score.is_none());
    }
}
