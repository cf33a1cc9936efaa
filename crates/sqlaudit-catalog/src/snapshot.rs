//! Read-only database backed by a JSON schema snapshot
//!
//! Lets the CLI audit a batch offline: metadata comes from a file instead of a
//! connection, and the Execute stage is refused.

use crate::adapter::{CatalogError, LiveDatabase};
use serde::{Deserialize, Serialize};
use sqlaudit_core::{TableInfo, TableKey};
use std::collections::HashMap;
use std::path::Path;

/// Serialized schema: databases plus table definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Databases that exist (those owning a table are implied)
    #[serde(default)]
    pub databases: Vec<String>,

    /// Table definitions
    #[serde(default)]
    pub tables: Vec<TableInfo>,
}

impl SchemaSnapshot {
    /// Load a snapshot from file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::InvalidMetadata(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&contents)
    }

    /// Parse a snapshot from a JSON string
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::InvalidMetadata(e.to_string()))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Read-only `LiveDatabase` over a [`SchemaSnapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotDatabase {
    snapshot: SchemaSnapshot,

    /// `schema.name` → position in `snapshot.tables`
    index: HashMap<String, usize>,
}

impl SnapshotDatabase {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        let index = snapshot
            .tables
            .iter()
            .enumerate()
            .map(|(pos, table)| (table.key().fqn(), pos))
            .collect();
        Self { snapshot, index }
    }

    /// Load from a snapshot file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        Ok(Self::new(SchemaSnapshot::from_file(path)?))
    }

    /// Number of tables in the snapshot
    pub fn table_count(&self) -> usize {
        self.snapshot.tables.len()
    }
}

#[async_trait::async_trait]
impl LiveDatabase for SnapshotDatabase {
    fn name(&self) -> &'static str {
        "Snapshot"
    }

    async fn database_exists(&self, database: &str) -> Result<bool, CatalogError> {
        Ok(self.snapshot.databases.iter().any(|d| d == database)
            || self.snapshot.tables.iter().any(|t| t.schema == database))
    }

    async fn fetch_table(&self, table: &TableKey) -> Result<Option<TableInfo>, CatalogError> {
        Ok(self
            .index
            .get(&table.fqn())
            .map(|&pos| self.snapshot.tables[pos].clone()))
    }

    async fn execute(&self, _sql: &str) -> Result<u64, CatalogError> {
        Err(CatalogError::ReadOnly(
            "a schema snapshot cannot execute statements".to_string(),
        ))
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}
