//! sqlaudit core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod schema;
pub mod record;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use schema::{
    quote_ident, quote_string, CheckConstraintInfo, CheckLevel, ColumnInfo, IndexInfo, IndexKind,
    TableInfo, TableKey, TableOption,
};
pub use record::{fingerprint, Record, RecordSet, Stage, StageStatus};
pub use report::{AuditReport, ReportSummary, ReportVersion, ResultRow};
pub use config::{AuditConfig, AuditRules, BackupTiming, ConfigError, SeverityThreshold, SourceOptions};
