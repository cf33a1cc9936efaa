//! Configuration schema (sqlaudit.toml)

use crate::diagnostic::{DiagnosticCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When rollback capture is persisted relative to the live write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupTiming {
    /// Persist before issuing the statement
    Before,

    /// Persist after the statement succeeded
    #[default]
    After,
}

/// Per-session source options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Default database for unqualified table names
    #[serde(default)]
    pub database: Option<String>,

    /// Run the Execute stage after a clean Check stage
    #[serde(default)]
    pub execute: bool,

    /// Persist rollback SQL during the Execute stage
    #[serde(default)]
    pub backup: bool,

    /// Persist rollback before or after the live write
    #[serde(default)]
    pub backup_timing: BackupTiming,

    /// Execute even when the Check stage raised warnings
    #[serde(default)]
    pub ignore_warnings: bool,

    /// Attach a SHA-256 fingerprint to each record
    #[serde(default)]
    pub enable_fingerprint: bool,
}

/// Audit policy switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRules {
    /// Allow DROP TABLE (an error when disabled)
    #[serde(default = "default_true")]
    pub enable_drop_table: bool,

    /// Warn when CREATE TABLE declares no primary key
    #[serde(default)]
    pub check_primary_key: bool,

    /// Warn on UPDATE/DELETE without WHERE
    #[serde(default = "default_true")]
    pub check_dml_where: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AuditRules {
    fn default() -> Self {
        Self {
            enable_drop_table: true,
            check_primary_key: false,
            check_dml_where: true,
        }
    }
}

/// Severity overrides for specific diagnostic codes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Source options
    #[serde(default)]
    pub options: SourceOptions,

    /// Policy rules
    #[serde(default)]
    pub rules: AuditRules,

    /// Severity overrides
    #[serde(default)]
    pub severity: SeverityThreshold,
}

impl AuditConfig {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
