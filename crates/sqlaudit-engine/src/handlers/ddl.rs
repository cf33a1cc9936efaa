//! USE, CREATE / DROP / RENAME / TRUNCATE TABLE

use super::alter::{add_inline_keys, add_key};
use super::{existing_table, table_exists, Handlers};
use crate::cache::LookupError;
use crate::checks::{add_table_check, attach_column_checks};
use crate::scope::StatementScope;
use sqlaudit_catalog::CatalogError;
use sqlaudit_core::{quote_ident, DiagnosticCode, TableInfo, TableKey};
use sqlaudit_sql::{CreateTable, DropTable, ObjectName, RenameTable, TableConstraint};
use tracing::debug;

impl Handlers<'_> {
    pub(super) async fn use_database(
        &mut self,
        database: &str,
        scope: &mut StatementScope,
    ) -> Result<(), CatalogError> {
        if self.db.database_exists(database).await? {
            debug!("Default database is now {}", database);
            *self.default_schema = Some(database.to_string());
        } else {
            scope.error(
                DiagnosticCode::DatabaseNotFound,
                format!("Unknown database '{}'", database),
            );
        }
        Ok(())
    }

    pub(super) async fn create_table(
        &mut self,
        create: &CreateTable,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        let Some(key) = self.resolve(&create.name, scope) else {
            return Ok(None);
        };

        if table_exists(self.cache, self.db, &key).await? {
            if create.if_not_exists {
                scope.info(
                    DiagnosticCode::StatementSkipped,
                    format!("Table '{}' already exists, statement skipped", key),
                );
            } else {
                scope.error(
                    DiagnosticCode::TableExists,
                    format!("Table '{}' already exists", key),
                );
            }
            return Ok(Some(key));
        }

        let table = match &create.like {
            Some(source) => {
                let Some(source_key) = self.resolve(source, scope) else {
                    return Ok(Some(key));
                };
                let Some(source_table) =
                    existing_table(self.cache, self.db, &source_key, scope).await?
                else {
                    return Ok(Some(key));
                };
                let mut table = source_table.clone();
                table.rename(&key);
                table
            }
            None => build_table(&key, create, scope),
        };
        if scope.is_aborted() {
            return Ok(Some(key));
        }

        if self.rules.check_primary_key && table.primary_key().is_none() {
            scope.warn(
                DiagnosticCode::TableWithoutPrimaryKey,
                format!("Table '{}' has no primary key", key),
            );
        }
        scope
            .rollback
            .push_statement(format!("DROP TABLE {};", key.quoted()));
        self.cache.put(table);
        Ok(Some(key))
    }

    /// Tables are dropped only when every named table resolves
    pub(super) async fn drop_table(
        &mut self,
        drop: &DropTable,
        scope: &mut StatementScope,
    ) -> Result<(), CatalogError> {
        if !self.rules.enable_drop_table {
            scope.error(
                DiagnosticCode::DropTableForbidden,
                "DROP TABLE is disabled by configuration",
            );
            return Ok(());
        }

        let mut dropped = Vec::new();
        for name in &drop.names {
            let Some(key) = self.resolve(name, scope) else {
                continue;
            };
            match self.cache.lookup(self.db, &key).await {
                Ok(table) => dropped.push((key, table.render_create())),
                Err(LookupError::NotFound(_)) if drop.if_exists => scope.info(
                    DiagnosticCode::StatementSkipped,
                    format!("Unknown table '{}', skipped", key),
                ),
                Err(LookupError::NotFound(_)) => scope.error(
                    DiagnosticCode::TableNotFound,
                    format!("Unknown table '{}'", key),
                ),
                Err(LookupError::Catalog { source, .. }) => return Err(source),
            }
        }
        if scope.is_aborted() {
            return Ok(());
        }

        for (key, create) in dropped {
            scope.rollback.push_statement(create);
            self.cache.mark_dropped(&key);
        }
        Ok(())
    }

    /// Pairs apply in order; a failing pair undoes the ones before it
    pub(super) async fn rename_table(
        &mut self,
        rename: &RenameTable,
        scope: &mut StatementScope,
    ) -> Result<(), CatalogError> {
        let mut applied: Vec<(TableKey, TableKey)> = Vec::new();
        for (from, to) in &rename.pairs {
            let (Some(from_key), Some(to_key)) = (self.resolve(from, scope), self.resolve(to, scope))
            else {
                break;
            };
            if existing_table(self.cache, self.db, &from_key, scope)
                .await?
                .is_none()
            {
                break;
            }
            if table_exists(self.cache, self.db, &to_key).await? {
                scope.error(
                    DiagnosticCode::TableExists,
                    format!("Table '{}' already exists", to_key),
                );
                break;
            }
            self.move_table(&from_key, &to_key);
            applied.push((from_key, to_key));
        }

        if scope.is_aborted() {
            for (from, to) in applied.iter().rev() {
                self.move_table(to, from);
            }
            return Ok(());
        }
        for (from, to) in &applied {
            scope.rollback.push_statement(format!(
                "RENAME TABLE {} TO {};",
                to.quoted(),
                from.quoted()
            ));
        }
        Ok(())
    }

    fn move_table(&mut self, from: &TableKey, to: &TableKey) {
        if let Some(mut table) = self.cache.mark_dropped(from) {
            table.rename(to);
            self.cache.put(table);
        }
    }

    pub(super) async fn truncate_table(
        &mut self,
        name: &ObjectName,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        let Some(key) = self.resolve(name, scope) else {
            return Ok(None);
        };
        if existing_table(self.cache, self.db, &key, scope).await?.is_some() {
            scope.warn(
                DiagnosticCode::RollbackUnavailable,
                format!("TRUNCATE TABLE {} cannot be rolled back", key.quoted()),
            );
        }
        Ok(Some(key))
    }
}

/// Table definition described by a CREATE TABLE body
fn build_table(key: &TableKey, create: &CreateTable, scope: &mut StatementScope) -> TableInfo {
    let mut table = TableInfo::new(key.schema.clone(), key.name.clone());
    table.options = create.options.clone();

    for column in &create.columns {
        if table.find_column(&column.name).is_some() {
            scope.error(
                DiagnosticCode::ColumnExists,
                format!("Duplicate column name '{}'", column.name),
            );
            continue;
        }
        table.columns.push(column.to_column_info());
        attach_column_checks(&mut table, &column.name, &column.options, scope);
        add_inline_keys(&mut table, column, scope);
    }

    let context = format!("TABLE {}", quote_ident(&key.name));
    for constraint in &create.constraints {
        match constraint {
            TableConstraint::Check(clause) => {
                add_table_check(&mut table, clause, &context, scope);
            }
            key_constraint => {
                add_key(&mut table, key_constraint, scope);
            }
        }
    }
    table
}
