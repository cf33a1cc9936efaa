//! Session schema cache
//!
//! Mirrors the tables a batch touches. Entries are loaded from the live
//! database on first reference and then mutated in lockstep with audited DDL,
//! so later statements see the effect of earlier ones without anything being
//! executed. A table dropped or renamed away in this batch is tombstoned.

use sqlaudit_catalog::{CatalogError, LiveDatabase};
use sqlaudit_core::{TableInfo, TableKey};
use sqlaudit_sql::normalize_check_expression;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Table '{0}' doesn't exist")]
    NotFound(TableKey),

    #[error("Metadata lookup for '{table}' failed: {source}")]
    Catalog { table: TableKey, source: CatalogError },
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Present(TableInfo),
    Dropped,
}

/// Table metadata keyed by `schema.name`, owned by one session
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<TableKey, CacheEntry>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table, loading it from `db` on a miss
    ///
    /// A missing table or a failed load leaves no entry behind.
    pub async fn lookup(
        &mut self,
        db: &dyn LiveDatabase,
        key: &TableKey,
    ) -> Result<&mut TableInfo, LookupError> {
        if !self.entries.contains_key(key) {
            debug!("Schema cache miss for {}, asking {}", key, db.name());
            let fetched = db.fetch_table(key).await.map_err(|source| LookupError::Catalog {
                table: key.clone(),
                source,
            })?;
            let Some(table) = fetched else {
                return Err(LookupError::NotFound(key.clone()));
            };
            self.entries
                .insert(key.clone(), CacheEntry::Present(normalized(table)));
        }

        match self.entries.get_mut(key) {
            Some(CacheEntry::Present(table)) => Ok(table),
            _ => Err(LookupError::NotFound(key.clone())),
        }
    }

    /// Whether the table exists, from this session's point of view
    pub async fn exists(&mut self, db: &dyn LiveDatabase, key: &TableKey) -> Result<bool, LookupError> {
        match self.lookup(db, key).await {
            Ok(_) => Ok(true),
            Err(LookupError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Install or replace an entry, keyed by the table's own identity
    pub fn put(&mut self, table: TableInfo) {
        self.entries.insert(table.key(), CacheEntry::Present(table));
    }

    /// Tombstone an entry, returning the definition it had
    pub fn mark_dropped(&mut self, key: &TableKey) -> Option<TableInfo> {
        match self.entries.insert(key.clone(), CacheEntry::Dropped) {
            Some(CacheEntry::Present(table)) => Some(table),
            _ => None,
        }
    }

    /// Cached definition, without consulting the live database
    pub fn get(&self, key: &TableKey) -> Option<&TableInfo> {
        match self.entries.get(key) {
            Some(CacheEntry::Present(table)) => Some(table),
            _ => None,
        }
    }

    /// Whether the table was dropped or renamed away in this batch
    pub fn is_dropped(&self, key: &TableKey) -> bool {
        matches!(self.entries.get(key), Some(CacheEntry::Dropped))
    }

    /// Number of entries, tombstones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything (start of a new stage)
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

/// Bring live CHECK text into canonical printer form and name unnamed checks
fn normalized(mut table: TableInfo) -> TableInfo {
    for check in &mut table.checks {
        match normalize_check_expression(&check.expression) {
            Ok(expression) => check.expression = expression,
            Err(e) => warn!(
                "Keeping CHECK expression of {}.{} as-is: {}",
                table.schema, table.name, e
            ),
        }
    }
    table.assign_check_names();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlaudit_catalog::MockDatabaseBuilder;
    use sqlaudit_core::{CheckConstraintInfo, ColumnInfo};

    fn users() -> TableInfo {
        TableInfo::new("test", "users")
            .with_columns(vec![ColumnInfo::new("age", "INT")])
            .with_check(CheckConstraintInfo::table("chk_age", "(`age` >= 18)", true))
    }

    #[tokio::test]
    async fn miss_loads_and_normalizes() {
        let db = MockDatabaseBuilder::new().with_table(users()).build();
        let mut cache = SchemaCache::new();
        let key = TableKey::new("test", "users");

        let table = cache.lookup(&db, &key).await.unwrap();
        assert_eq!(table.checks[0].expression, "`age`>=18");
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key).is_some());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let locked = TableKey::new("test", "locked");
        let db = MockDatabaseBuilder::new()
            .with_error(locked.clone(), CatalogError::ConnectionError("gone".into()))
            .build();
        let mut cache = SchemaCache::new();

        let missing = TableKey::new("test", "missing");
        assert_eq!(
            cache.lookup(&db, &missing).await.unwrap_err(),
            LookupError::NotFound(missing.clone())
        );
        assert!(matches!(
            cache.lookup(&db, &locked).await,
            Err(LookupError::Catalog { .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn mutations_are_visible_to_later_lookups() {
        let db = MockDatabaseBuilder::new().with_table(users()).build();
        let mut cache = SchemaCache::new();
        let key = TableKey::new("test", "users");

        cache.lookup(&db, &key).await.unwrap().checks.clear();
        assert!(cache.lookup(&db, &key).await.unwrap().checks.is_empty());
    }

    #[tokio::test]
    async fn tombstone_hides_live_table() {
        let db = MockDatabaseBuilder::new().with_table(users()).build();
        let mut cache = SchemaCache::new();
        let key = TableKey::new("test", "users");

        assert!(cache.exists(&db, &key).await.unwrap());
        let dropped = cache.mark_dropped(&key);
        assert_eq!(dropped.map(|t| t.name), Some("users".to_string()));
        assert!(cache.is_dropped(&key));
        assert!(!cache.exists(&db, &key).await.unwrap());

        cache.put(TableInfo::new("test", "users"));
        assert!(cache.exists(&db, &key).await.unwrap());

        cache.reset();
        assert!(cache.is_empty());
    }
}
