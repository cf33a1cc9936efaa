//! Result set report (stable v1)
//!
//! One row per audited statement, in batch order.
//! Breaking changes require a new version.

use crate::record::{Record, RecordSet, Stage};
use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One row of the result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    /// 1-based statement order
    pub id: usize,

    /// Stage that produced the row
    pub stage: Stage,

    /// 0 info, 1 warning, 2 error
    pub err_level: u8,

    /// Resolved stage-status label
    pub stage_status: String,

    /// Diagnostic messages, newline separated
    pub error_message: String,

    /// Statement text
    pub sql: String,

    /// Rows affected by execution
    pub affected_rows: u64,

    /// Rollback statement, empty when none
    pub rollback_sql: String,

    /// Statement fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl From<&Record> for ResultRow {
    fn from(record: &Record) -> Self {
        Self {
            id: record.sequence,
            stage: record.stage,
            err_level: record.err_level(),
            stage_status: record.stage_status.label().to_string(),
            error_message: record.message(),
            sql: record.sql.clone(),
            affected_rows: record.affected_rows,
            rollback_sql: record.rollback_sql.clone(),
            fingerprint: record.fingerprint.clone(),
        }
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of statements
    pub total: usize,

    /// Statements with error level 2
    pub errors: usize,

    /// Statements with error level 1
    pub warnings: usize,

    /// Statements with error level 0
    pub clean: usize,

    /// Statements carrying rollback SQL
    pub with_rollback: usize,
}

/// Audit report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// One row per statement
    pub rows: Vec<ResultRow>,
}

impl AuditReport {
    /// Build a report from a batch's records
    pub fn from_records(records: &RecordSet) -> Self {
        let rows: Vec<ResultRow> = records.iter().map(ResultRow::from).collect();

        let summary = ReportSummary {
            total: rows.len(),
            errors: rows.iter().filter(|r| r.err_level >= 2).count(),
            warnings: rows.iter().filter(|r| r.err_level == 1).count(),
            clean: rows.iter().filter(|r| r.err_level == 0).count(),
            with_rollback: rows.iter().filter(|r| !r.rollback_sql.is_empty()).count(),
        };

        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary,
            rows,
        }
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, DiagnosticCode};
    use crate::record::StageStatus;

    fn sample_records() -> RecordSet {
        let mut set = RecordSet::new();

        let mut create = Record::new(1, "CREATE TABLE t1(id INT PRIMARY KEY)", Stage::Execute);
        create.stage_status = StageStatus::ExecuteSucceeded;
        create.rollback_sql = "DROP TABLE `test`.`t1`;".to_string();
        set.push(create);

        let mut broken = Record::new(2, "ALTER TABLE t1 DROP CHECK nope", Stage::Check);
        broken.push(Diagnostic::error(DiagnosticCode::CheckNotFound, "CHECK `nope` not found"));
        set.push(broken);

        set
    }

    #[test]
    fn report_rows_follow_record_order() {
        let report = AuditReport::from_records(&sample_records());

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.with_rollback, 1);
        assert!(report.has_errors());

        assert_eq!(report.rows[0].id, 1);
        assert_eq!(report.rows[0].stage_status, "Execute Successfully");
        assert_eq!(report.rows[1].error_message, "CHECK `nope` not found");
    }

    #[test]
    fn report_serialization() {
        let report = AuditReport::from_records(&RecordSet::new());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"rows\""));
        assert!(!report.has_errors());
    }
}
