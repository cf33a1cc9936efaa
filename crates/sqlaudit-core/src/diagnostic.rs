//! Diagnostic codes and severities
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API
//! (severity overrides in `sqlaudit.toml` refer to them by string).

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Parse failures
    /// Statement text could not be parsed
    SqlParseError,

    /// Statement kind is not audited
    SqlUnsupportedStatement,

    // Semantic errors
    /// `USE` names a database that does not exist
    DatabaseNotFound,

    /// Unqualified table name with no default database
    NoDatabaseSelected,

    /// Referenced table does not exist
    TableNotFound,

    /// Table to create already exists
    TableExists,

    /// Referenced column does not exist
    ColumnNotFound,

    /// Column to add already exists
    ColumnExists,

    /// Referenced index does not exist
    IndexNotFound,

    /// Index to add already exists
    IndexExists,

    /// Referenced CHECK constraint does not exist
    CheckNotFound,

    /// CHECK constraint name already in use
    CheckExists,

    /// Column-level CHECK constraints cannot be NOT ENFORCED
    ColumnCheckAlwaysEnforced,

    /// Column cannot be dropped or renamed while a CHECK constraint reads it
    CheckDependsOnColumn,

    // Policy warnings
    /// CHECK constraint declared NOT ENFORCED
    CheckNotEnforced,

    /// DROP TABLE disabled by configuration
    DropTableForbidden,

    /// Table created without a primary key
    TableWithoutPrimaryKey,

    /// UPDATE or DELETE without a WHERE clause
    DmlWithoutWhere,

    /// Statement has no structural rollback
    RollbackUnavailable,

    // Descriptive annotations
    /// CHECK constraint attached to a column or table
    CheckAttached,

    /// CHECK constraint dropped
    CheckDropped,

    /// CHECK constraint enforcement changed
    CheckEnforcementChanged,

    /// Statement is a no-op (IF EXISTS / IF NOT EXISTS)
    StatementSkipped,

    // Execute stage
    /// The live database rejected the statement
    ExecuteFailed,

    /// Rollback capture could not be persisted
    BackupFailed,

    /// Metadata lookup failed for a reason other than absence
    CatalogUnavailable,

    // General
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlUnsupportedStatement => "SQL_UNSUPPORTED_STATEMENT",
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
            Self::NoDatabaseSelected => "NO_DATABASE_SELECTED",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::TableExists => "TABLE_EXISTS",
            Self::ColumnNotFound => "COLUMN_NOT_FOUND",
            Self::ColumnExists => "COLUMN_EXISTS",
            Self::IndexNotFound => "INDEX_NOT_FOUND",
            Self::IndexExists => "INDEX_EXISTS",
            Self::CheckNotFound => "CHECK_NOT_FOUND",
            Self::CheckExists => "CHECK_EXISTS",
            Self::ColumnCheckAlwaysEnforced => "COLUMN_CHECK_ALWAYS_ENFORCED",
            Self::CheckDependsOnColumn => "CHECK_DEPENDS_ON_COLUMN",
            Self::CheckNotEnforced => "CHECK_NOT_ENFORCED",
            Self::DropTableForbidden => "DROP_TABLE_FORBIDDEN",
            Self::TableWithoutPrimaryKey => "TABLE_WITHOUT_PRIMARY_KEY",
            Self::DmlWithoutWhere => "DML_WITHOUT_WHERE",
            Self::RollbackUnavailable => "ROLLBACK_UNAVAILABLE",
            Self::CheckAttached => "CHECK_ATTACHED",
            Self::CheckDropped => "CHECK_DROPPED",
            Self::CheckEnforcementChanged => "CHECK_ENFORCEMENT_CHANGED",
            Self::StatementSkipped => "STATEMENT_SKIPPED",
            Self::ExecuteFailed => "EXECUTE_FAILED",
            Self::BackupFailed => "BACKUP_FAILED",
            Self::CatalogUnavailable => "CATALOG_UNAVAILABLE",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
///
/// Ordered so that `max` yields the most severe; maps onto the
/// statement error level 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - allowed but discouraged
    Warn,

    /// Error - the statement is aborted
    Error,
}

impl Severity {
    /// Numeric error level (0 info, 1 warning, 2 error)
    pub fn level(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warn => 1,
            Self::Error => 2,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message attached to one audited statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
        }
    }

    /// Informational diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    /// Warning diagnostic
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::CheckNotEnforced.as_str(), "CHECK_NOT_ENFORCED");
        assert_eq!(DiagnosticCode::TableNotFound.as_str(), "TABLE_NOT_FOUND");
    }

    #[test]
    fn severity_levels_are_ordered() {
        assert!(Severity::Error > Severity::Warn);
        assert_eq!(Severity::Info.max(Severity::Warn), Severity::Warn);
        assert_eq!(Severity::Error.level(), 2);
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::error(DiagnosticCode::ColumnNotFound, "Column `x` not found");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("error"));
    }
}
