//! Mock live database for testing
//!
//! Returns predefined table definitions and records every executed statement
//! without connecting to MySQL. Useful for:
//! - Unit testing handlers against a known schema
//! - Exercising the Execute stage without side effects
//! - Simulating metadata and execution failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! let db = MockDatabase::new();
//! db.add_table(TableInfo::new("test", "t1").with_columns(vec![ColumnInfo::new("id", "INT")])).await;
//!
//! // Reject any statement that mentions `t2`
//! db.fail_execution_matching("t2", CatalogError::ExecuteError("Table 't2' is locked".into())).await;
//! ```

use crate::adapter::{CatalogError, LiveDatabase};
use sqlaudit_core::{TableInfo, TableKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory live database
///
/// Clones share state, so a test can keep a handle after passing one to a
/// session and inspect what was executed.
pub struct MockDatabase {
    /// Table definitions by `schema.name`
    tables: Arc<RwLock<HashMap<String, TableInfo>>>,

    /// Databases that exist even without tables
    databases: Arc<RwLock<HashSet<String>>>,

    /// Metadata errors for specific tables
    errors: Arc<RwLock<HashMap<String, CatalogError>>>,

    /// Execution failures, matched by substring of the statement text
    execute_failures: Arc<RwLock<Vec<(String, CatalogError)>>>,

    /// Statements passed to `execute`, in order
    executed: Arc<RwLock<Vec<String>>>,

    /// Rows reported for every executed statement
    affected_rows: u64,

    /// Simulate connection failure
    fail_connection: bool,

    /// Name to return from name() method
    adapter_name: &'static str,
}

impl MockDatabase {
    /// Create a mock database with no tables
    pub fn new() -> Self {
        Self::from_tables(Vec::new())
    }

    /// Create a mock database from a list of table definitions
    pub fn from_tables(tables: Vec<TableInfo>) -> Self {
        MockDatabaseBuilder::new().with_tables(tables).build()
    }

    /// Add or replace a table definition
    pub async fn add_table(&self, table: TableInfo) {
        self.databases.write().await.insert(table.schema.clone());
        self.tables.write().await.insert(table.key().fqn(), table);
    }

    /// Register an empty database
    pub async fn add_database(&self, database: &str) {
        self.databases.write().await.insert(database.to_string());
    }

    /// Configure an error to be returned when fetching a specific table
    pub async fn add_error_for_table(&self, table: &TableKey, error: CatalogError) {
        self.errors.write().await.insert(table.fqn(), error);
    }

    /// Reject every statement whose text contains `pattern`
    pub async fn fail_execution_matching(&self, pattern: &str, error: CatalogError) {
        self.execute_failures
            .write()
            .await
            .push((pattern.to_string(), error));
    }

    /// Statements executed so far, in order
    pub async fn executed_statements(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    /// Number of stored table definitions
    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }

    /// Check if a table definition exists
    pub async fn has_table(&self, table: &TableKey) -> bool {
        self.tables.read().await.contains_key(&table.fqn())
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Rows reported by `execute`
    pub fn with_affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }

    /// Set a custom adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockDatabase {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            databases: Arc::clone(&self.databases),
            errors: Arc::clone(&self.errors),
            execute_failures: Arc::clone(&self.execute_failures),
            executed: Arc::clone(&self.executed),
            affected_rows: self.affected_rows,
            fail_connection: self.fail_connection,
            adapter_name: self.adapter_name,
        }
    }
}

#[async_trait::async_trait]
impl LiveDatabase for MockDatabase {
    fn name(&self) -> &'static str {
        self.adapter_name
    }

    async fn database_exists(&self, database: &str) -> Result<bool, CatalogError> {
        if self.databases.read().await.contains(database) {
            return Ok(true);
        }
        Ok(self.tables.read().await.values().any(|t| t.schema == database))
    }

    async fn fetch_table(&self, table: &TableKey) -> Result<Option<TableInfo>, CatalogError> {
        // Check for configured errors first
        if let Some(error) = self.errors.read().await.get(&table.fqn()) {
            return Err(error.clone());
        }

        Ok(self.tables.read().await.get(&table.fqn()).cloned())
    }

    async fn execute(&self, sql: &str) -> Result<u64, CatalogError> {
        if let Some((_, error)) = self
            .execute_failures
            .read()
            .await
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(error.clone());
        }

        self.executed.write().await.push(sql.to_string());
        Ok(self.affected_rows)
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        if self.fail_connection {
            Err(CatalogError::ConnectionError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Builder for creating a MockDatabase with several tables
///
/// ```rust,ignore
/// let db = MockDatabaseBuilder::new()
///     .with_table(users)
///     .with_database("empty_db")
///     .with_error(TableKey::new("test", "locked"), CatalogError::PermissionDenied("no".into()))
///     .build();
/// ```
pub struct MockDatabaseBuilder {
    tables: HashMap<String, TableInfo>,
    databases: HashSet<String>,
    errors: HashMap<String, CatalogError>,
    execute_failures: Vec<(String, CatalogError)>,
    affected_rows: u64,
    fail_connection: bool,
    adapter_name: &'static str,
}

impl MockDatabaseBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            databases: HashSet::new(),
            errors: HashMap::new(),
            execute_failures: Vec::new(),
            affected_rows: 0,
            fail_connection: false,
            adapter_name: "Mock",
        }
    }

    /// Add a table definition
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.databases.insert(table.schema.clone());
        self.tables.insert(table.key().fqn(), table);
        self
    }

    /// Add several table definitions
    pub fn with_tables(self, tables: Vec<TableInfo>) -> Self {
        tables.into_iter().fold(self, |builder, table| builder.with_table(table))
    }

    /// Register an empty database
    pub fn with_database(mut self, database: &str) -> Self {
        self.databases.insert(database.to_string());
        self
    }

    /// Add a metadata error for a specific table
    pub fn with_error(mut self, table: TableKey, error: CatalogError) -> Self {
        self.errors.insert(table.fqn(), error);
        self
    }

    /// Reject statements containing `pattern`
    pub fn with_execute_failure(mut self, pattern: &str, error: CatalogError) -> Self {
        self.execute_failures.push((pattern.to_string(), error));
        self
    }

    /// Rows reported by `execute`
    pub fn with_affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Set adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }

    /// Build the MockDatabase
    pub fn build(self) -> MockDatabase {
        MockDatabase {
            tables: Arc::new(RwLock::new(self.tables)),
            databases: Arc::new(RwLock::new(self.databases)),
            errors: Arc::new(RwLock::new(self.errors)),
            execute_failures: Arc::new(RwLock::new(self.execute_failures)),
            executed: Arc::new(RwLock::new(Vec::new())),
            affected_rows: self.affected_rows,
            fail_connection: self.fail_connection,
            adapter_name: self.adapter_name,
        }
    }
}

impl Default for MockDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
