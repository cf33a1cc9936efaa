//! Per-statement audit records

use crate::diagnostic::{Diagnostic, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Dry-run audit against the schema cache only
    Check,

    /// Real application against the live database
    Execute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check => write!(f, "CHECKED"),
            Self::Execute => write!(f, "EXECUTED"),
        }
    }
}

/// Terminal state of a statement, resolved to a label at report time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    AuditCompleted,
    ExecuteFailed,
    ExecuteSucceeded,
    BackupSucceeded,
    BackupFailed,
    Skipped,
}

impl StageStatus {
    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::AuditCompleted => "Audit Completed",
            Self::ExecuteFailed => "Execute failed",
            Self::ExecuteSucceeded => "Execute Successfully",
            Self::BackupSucceeded => "Execute Successfully\nBackup successfully",
            Self::BackupFailed => "Execute Successfully\nBackup failed",
            Self::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Audit record for one statement
///
/// The error level only ever rises: it is raised by [`Record::push`] and read
/// through [`Record::err_level`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based position in the batch
    pub sequence: usize,

    /// Statement text
    pub sql: String,

    /// Stage that produced this record
    pub stage: Stage,

    /// 0 info, 1 warning, 2 error
    err_level: u8,

    /// Terminal state
    pub stage_status: StageStatus,

    /// Diagnostics in emission order
    pub diagnostics: Vec<Diagnostic>,

    /// Rollback statement text, empty when none
    pub rollback_sql: String,

    /// Rows affected by the live statement
    pub affected_rows: u64,

    /// Statement fingerprint, when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Record {
    /// Create an empty record for a statement
    pub fn new(sequence: usize, sql: impl Into<String>, stage: Stage) -> Self {
        Self {
            sequence,
            sql: sql.into(),
            stage,
            err_level: 0,
            stage_status: StageStatus::AuditCompleted,
            diagnostics: Vec::new(),
            rollback_sql: String::new(),
            affected_rows: 0,
            fingerprint: None,
        }
    }

    /// Append a diagnostic, raising the error level if needed
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.err_level = self.err_level.max(diagnostic.severity.level());
        self.diagnostics.push(diagnostic);
    }

    /// 0 info, 1 warning, 2 error
    pub fn err_level(&self) -> u8 {
        self.err_level
    }

    /// Most severe diagnostic so far
    pub fn severity(&self) -> Severity {
        match self.err_level {
            0 => Severity::Info,
            1 => Severity::Warn,
            _ => Severity::Error,
        }
    }

    /// Whether the statement was aborted (error level 2)
    pub fn is_aborted(&self) -> bool {
        self.err_level >= 2
    }

    /// Diagnostic messages joined by newline
    pub fn message(&self) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Ordered records for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    /// Create an empty record set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at position `index`
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Highest error level across all records
    pub fn max_err_level(&self) -> u8 {
        self.records.iter().map(Record::err_level).max().unwrap_or(0)
    }

    /// Whether any statement was aborted
    pub fn has_errors(&self) -> bool {
        self.max_err_level() >= 2
    }

    /// Whether any statement raised a warning
    pub fn has_warnings(&self) -> bool {
        self.records.iter().any(|r| r.err_level() == 1)
    }

    /// Consume into the underlying records
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// SHA-256 fingerprint of a statement
///
/// Whitespace runs collapse to one space and case is folded, so cosmetic
/// differences do not change the fingerprint.
pub fn fingerprint(sql: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let normalized = whitespace.replace_all(sql.trim(), " ").to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;

    #[test]
    fn err_level_never_decreases() {
        let mut record = Record::new(1, "ALTER TABLE t DROP CHECK c", Stage::Check);
        record.push(Diagnostic::warn(DiagnosticCode::CheckNotEnforced, "warn"));
        record.push(Diagnostic::info(DiagnosticCode::Info, "info"));
        assert_eq!(record.err_level(), 1);

        record.push(Diagnostic::error(DiagnosticCode::CheckNotFound, "error"));
        record.push(Diagnostic::warn(DiagnosticCode::Warning, "warn again"));
        assert_eq!(record.err_level(), 2);
        assert!(record.is_aborted());
        assert_eq!(record.message(), "warn\ninfo\nerror\nwarn again");
    }

    #[test]
    fn record_set_levels() {
        let mut set = RecordSet::new();
        set.push(Record::new(1, "a", Stage::Check));
        let mut warned = Record::new(2, "b", Stage::Check);
        warned.push(Diagnostic::warn(DiagnosticCode::Warning, "w"));
        set.push(warned);

        assert_eq!(set.len(), 2);
        assert_eq!(set.max_err_level(), 1);
        assert!(set.has_warnings());
        assert!(!set.has_errors());
    }

    #[test]
    fn status_labels() {
        assert_eq!(StageStatus::AuditCompleted.label(), "Audit Completed");
        assert_eq!(
            StageStatus::BackupSucceeded.to_string(),
            "Execute Successfully\nBackup successfully"
        );
    }

    #[test]
    fn fingerprint_ignores_cosmetic_differences() {
        assert_eq!(
            fingerprint("INSERT INTO t1 VALUES(1)"),
            fingerprint("  insert   into t1\nvalues(1) ")
        );
        assert_ne!(fingerprint("DELETE FROM t1"), fingerprint("DELETE FROM t2"));
        assert_eq!(fingerprint("x").len(), 64);
    }
}
