//! Statement scope: the record and rollback buffer of the statement being audited

use crate::rollback::RollbackBuffer;
use sqlaudit_core::{Diagnostic, DiagnosticCode, Record, SeverityThreshold, Severity, Stage};

/// Everything a handler may write to while processing one statement
///
/// Diagnostics go through the configured severity overrides before they
/// reach the record.
#[derive(Debug)]
pub struct StatementScope {
    pub record: Record,
    pub rollback: RollbackBuffer,
    severity: SeverityThreshold,
}

impl StatementScope {
    pub fn new(record: Record, severity: SeverityThreshold) -> Self {
        Self {
            record,
            rollback: RollbackBuffer::new(),
            severity,
        }
    }

    /// Check-stage scope with no overrides
    pub fn for_check(sequence: usize, sql: &str) -> Self {
        Self::new(Record::new(sequence, sql, Stage::Check), SeverityThreshold::default())
    }

    pub fn emit(&mut self, code: DiagnosticCode, default: Severity, message: impl Into<String>) {
        let severity = self.severity.get_severity(code, default);
        self.record.push(Diagnostic::new(code, severity, message));
    }

    pub fn info(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.emit(code, Severity::Info, message);
    }

    pub fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.emit(code, Severity::Warn, message);
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.emit(code, Severity::Error, message);
    }

    pub fn is_aborted(&self) -> bool {
        self.record.is_aborted()
    }

    pub fn finish(self) -> (Record, RollbackBuffer) {
        (self.record, self.rollback)
    }
}
