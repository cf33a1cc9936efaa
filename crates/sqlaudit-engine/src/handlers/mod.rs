//! Statement handlers
//!
//! One handler per statement kind, selected by an exhaustive match. Handlers
//! validate against the schema cache, mutate it to reflect the statement and
//! record the inverse in the scope's rollback buffer. Semantic problems become
//! diagnostics; only collaborator failures are returned as errors.

mod alter;
mod ddl;
mod dml;

use crate::cache::{LookupError, SchemaCache};
use crate::scope::StatementScope;
use sqlaudit_catalog::{CatalogError, LiveDatabase};
use sqlaudit_core::{AuditRules, DiagnosticCode, TableInfo, TableKey};
use sqlaudit_sql::{AuditStatement, ObjectName};

pub(crate) struct Handlers<'a> {
    pub cache: &'a mut SchemaCache,
    pub db: &'a dyn LiveDatabase,
    pub rules: &'a AuditRules,
    pub default_schema: &'a mut Option<String>,
}

impl Handlers<'_> {
    /// Audit one statement, returning the table it targets (if any)
    pub async fn dispatch(
        &mut self,
        statement: &AuditStatement,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        match statement {
            AuditStatement::Use { database } => {
                self.use_database(database, scope).await?;
                Ok(None)
            }
            AuditStatement::CreateTable(create) => self.create_table(create, scope).await,
            AuditStatement::DropTable(drop) => {
                self.drop_table(drop, scope).await?;
                Ok(None)
            }
            AuditStatement::AlterTable(alter) => self.alter_table(alter, scope).await,
            AuditStatement::RenameTable(rename) => {
                self.rename_table(rename, scope).await?;
                Ok(None)
            }
            AuditStatement::TruncateTable(name) => self.truncate_table(name, scope).await,
            AuditStatement::Insert(dml) => self.insert(dml, scope).await,
            AuditStatement::Update(dml) | AuditStatement::Delete(dml) => {
                self.update_or_delete(statement.kind(), dml, scope).await
            }
            AuditStatement::Query => Ok(None),
        }
    }

    /// Qualify a name with the session's default database
    fn resolve(&self, name: &ObjectName, scope: &mut StatementScope) -> Option<TableKey> {
        let key = name.resolve(self.default_schema.as_deref());
        if key.is_none() {
            scope.error(DiagnosticCode::NoDatabaseSelected, "No database selected");
        }
        key
    }
}

/// Existing table, or a TABLE_NOT_FOUND error on the record
async fn existing_table<'c>(
    cache: &'c mut SchemaCache,
    db: &dyn LiveDatabase,
    key: &TableKey,
    scope: &mut StatementScope,
) -> Result<Option<&'c mut TableInfo>, CatalogError> {
    match cache.lookup(db, key).await {
        Ok(table) => Ok(Some(table)),
        Err(LookupError::NotFound(_)) => {
            scope.error(
                DiagnosticCode::TableNotFound,
                format!("Table '{}' doesn't exist", key),
            );
            Ok(None)
        }
        Err(LookupError::Catalog { source, .. }) => Err(source),
    }
}

/// Whether the table exists, as this session sees it
async fn table_exists(
    cache: &mut SchemaCache,
    db: &dyn LiveDatabase,
    key: &TableKey,
) -> Result<bool, CatalogError> {
    cache.exists(db, key).await.map_err(|err| match err {
        LookupError::Catalog { source, .. } => source,
        LookupError::NotFound(table) => {
            CatalogError::InvalidMetadata(format!("unexpected lookup miss for {}", table))
        }
    })
}
