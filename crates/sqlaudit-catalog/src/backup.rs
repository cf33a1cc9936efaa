//! Rollback persistence and DML row capture
//!
//! During the Execute stage with backup enabled, the session asks the store
//! for row-level rollback statements of each DML statement, then persists the
//! statement's full rollback text as one [`BackupEntry`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlaudit_core::TableKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Kind of data change being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

/// Request to capture the row images a DML statement will change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmlCapture {
    pub table: TableKey,
    pub kind: DmlKind,
    pub sql: String,
}

/// One persisted rollback record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// 1-based statement order within the batch
    pub sequence: usize,

    /// Target table, when the statement has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableKey>,

    /// Statement that was applied
    pub sql: String,

    /// Statement(s) undoing it
    pub rollback_sql: String,

    /// RFC 3339 timestamp
    pub created_at: String,
}

impl BackupEntry {
    pub fn new(
        sequence: usize,
        table: Option<TableKey>,
        sql: impl Into<String>,
        rollback_sql: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            table,
            sql: sql.into(),
            rollback_sql: rollback_sql.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Backup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    #[error("Row capture failed: {0}")]
    CaptureError(String),

    #[error("Persist failed: {0}")]
    PersistError(String),
}

/// Rollback persistence collaborator
#[async_trait::async_trait]
pub trait BackupStore: Send + Sync {
    /// Store name, used in logs
    fn name(&self) -> &'static str;

    /// Row-level rollback statements for a DML statement
    async fn capture_rows(&self, capture: &DmlCapture) -> Result<Vec<String>, BackupError>;

    /// Persist one statement's rollback
    async fn persist(&self, entry: &BackupEntry) -> Result<(), BackupError>;
}

/// In-memory backup store
///
/// Row images are preloaded per table; clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackupStore {
    entries: Arc<RwLock<Vec<BackupEntry>>>,

    /// Rollback statements returned by `capture_rows`, by `schema.name`
    row_images: Arc<RwLock<HashMap<String, Vec<String>>>>,

    fail_capture: bool,
    fail_persist: bool,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rollback statements to hand out for DML against `table`
    pub async fn add_row_images(&self, table: &TableKey, rollback: Vec<String>) {
        self.row_images.write().await.insert(table.fqn(), rollback);
    }

    /// Fail every `capture_rows` call
    pub fn with_capture_failure(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    /// Fail every `persist` call
    pub fn with_persist_failure(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    /// Persisted entries, in order
    pub async fn entries(&self) -> Vec<BackupEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl BackupStore for MemoryBackupStore {
    fn name(&self) -> &'static str {
        "Memory"
    }

    async fn capture_rows(&self, capture: &DmlCapture) -> Result<Vec<String>, BackupError> {
        if self.fail_capture {
            return Err(BackupError::CaptureError(format!(
                "Simulated capture failure for {}",
                capture.table
            )));
        }
        Ok(self
            .row_images
            .read()
            .await
            .get(&capture.table.fqn())
            .cloned()
            .unwrap_or_default())
    }

    async fn persist(&self, entry: &BackupEntry) -> Result<(), BackupError> {
        if self.fail_persist {
            return Err(BackupError::PersistError(
                "Simulated persist failure".to_string(),
            ));
        }
        self.entries.write().await.push(entry.clone());
        debug!("Persisted rollback for statement {}", entry.sequence);
        Ok(())
    }
}
