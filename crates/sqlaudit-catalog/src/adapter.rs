//! Live database trait for metadata lookup and statement execution

use sqlaudit_core::{TableInfo, TableKey};

/// Errors raised by a live database collaborator
///
/// "Table does not exist" is not an error: `fetch_table` returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Metadata query failed: {0}")]
    QueryError(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Statement rejected: {0}")]
    ExecuteError(String),

    #[error("Read-only database: {0}")]
    ReadOnly(String),
}

/// A schema-scoped, already-authenticated database handle
#[async_trait::async_trait]
pub trait LiveDatabase: Send + Sync {
    /// Collaborator name (e.g., "Mock", "Snapshot")
    fn name(&self) -> &'static str;

    /// Whether a database (schema) exists
    async fn database_exists(&self, database: &str) -> Result<bool, CatalogError>;

    /// Fetch a table's current definition
    ///
    /// Returns `Ok(None)` when the table does not exist. CHECK expressions may
    /// be in any textual form; the schema cache normalizes them on load.
    async fn fetch_table(&self, table: &TableKey) -> Result<Option<TableInfo>, CatalogError>;

    /// Issue a statement, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64, CatalogError>;

    /// Validate the connection before a batch starts
    async fn test_connection(&self) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = CatalogError::ExecuteError("Duplicate column name 'c1'".to_string());
        assert_eq!(err.to_string(), "Statement rejected: Duplicate column name 'c1'");
        assert_eq!(err.clone(), err);
    }
}
