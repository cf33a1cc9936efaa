//! INSERT, UPDATE and DELETE
//!
//! DML changes no structure; row-level rollback comes from the backup store
//! during the Execute stage.

use super::{existing_table, Handlers};
use crate::scope::StatementScope;
use sqlaudit_catalog::CatalogError;
use sqlaudit_core::{DiagnosticCode, TableKey};
use sqlaudit_sql::DmlStatement;

impl Handlers<'_> {
    pub(super) async fn insert(
        &mut self,
        dml: &DmlStatement,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        let Some(key) = self.resolve(&dml.table, scope) else {
            return Ok(None);
        };
        let Some(table) = existing_table(self.cache, self.db, &key, scope).await? else {
            return Ok(Some(key));
        };

        for column in &dml.columns {
            if table.find_column(column).is_none() {
                scope.error(
                    DiagnosticCode::ColumnNotFound,
                    format!("Unknown column '{}' in table '{}'", column, key),
                );
            }
        }
        Ok(Some(key))
    }

    pub(super) async fn update_or_delete(
        &mut self,
        kind: &str,
        dml: &DmlStatement,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        let Some(key) = self.resolve(&dml.table, scope) else {
            return Ok(None);
        };
        if existing_table(self.cache, self.db, &key, scope).await?.is_none() {
            return Ok(Some(key));
        }

        if self.rules.check_dml_where && !dml.has_where {
            scope.warn(
                DiagnosticCode::DmlWithoutWhere,
                format!("{} without WHERE affects every row of '{}'", kind, key),
            );
        }
        Ok(Some(key))
    }
}
