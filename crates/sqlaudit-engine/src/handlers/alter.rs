//! ALTER TABLE
//!
//! Sub-clauses are applied in order to a working copy of the cached table.
//! The copy replaces the cache entry only when every sub-clause succeeded, so
//! an aborted statement leaves the cache untouched.

use super::{existing_table, table_exists, Handlers};
use crate::checks::{
    add_check_rollback, add_table_check, alter_check_enforcement, attach_column_checks, drop_check,
    drop_check_rollback, ensure_column_unreferenced, remove_table_checks_on, update_column_checks,
};
use crate::scope::StatementScope;
use sqlaudit_catalog::CatalogError;
use sqlaudit_core::{
    quote_ident, CheckConstraintInfo, DiagnosticCode, IndexInfo, IndexKind, TableInfo, TableKey,
};
use sqlaudit_sql::{AlterSpec, AlterTable, ColumnPosition, ColumnSpec, ObjectName, TableConstraint};

impl Handlers<'_> {
    pub(super) async fn alter_table(
        &mut self,
        alter: &AlterTable,
        scope: &mut StatementScope,
    ) -> Result<Option<TableKey>, CatalogError> {
        let Some(key) = self.resolve(&alter.name, scope) else {
            return Ok(None);
        };
        let Some(table) = existing_table(self.cache, self.db, &key, scope).await? else {
            return Ok(Some(key));
        };

        let mut working = table.clone();
        for spec in &alter.specs {
            self.apply_spec(&mut working, spec, scope).await?;
            if scope.is_aborted() {
                return Ok(Some(key));
            }
        }

        let new_key = working.key();
        if new_key != key {
            self.cache.mark_dropped(&key);
        }
        self.cache.put(working);
        scope.rollback.set_alter_target(new_key.clone());
        Ok(Some(new_key))
    }

    async fn apply_spec(
        &mut self,
        table: &mut TableInfo,
        spec: &AlterSpec,
        scope: &mut StatementScope,
    ) -> Result<(), CatalogError> {
        match spec {
            AlterSpec::AddColumn { column, position } => {
                add_column(table, column, position.as_ref(), scope)
            }
            AlterSpec::DropColumn { name } => drop_column(table, name, scope),
            AlterSpec::ModifyColumn { column, position } => {
                change_column(table, &column.name, column, position.as_ref(), scope)
            }
            AlterSpec::ChangeColumn {
                old_name,
                column,
                position,
            } => change_column(table, old_name, column, position.as_ref(), scope),
            AlterSpec::RenameColumn { old_name, new_name } => {
                rename_column(table, old_name, new_name, scope)
            }
            AlterSpec::AddConstraint(TableConstraint::Check(clause)) => {
                let context = format!("TABLE {}", quote_ident(&table.name));
                if let Some(pos) = add_table_check(table, clause, &context, scope) {
                    scope
                        .rollback
                        .push_fragment(add_check_rollback(&table.checks[pos].name));
                }
            }
            AlterSpec::AddConstraint(constraint) => {
                if let Some(index) = add_key(table, constraint, scope) {
                    scope.rollback.push_fragment(format!("{},", index.drop_clause()));
                }
            }
            AlterSpec::DropIndex { name } => drop_index(table, name, scope),
            AlterSpec::DropPrimaryKey => drop_index(table, IndexInfo::PRIMARY, scope),
            AlterSpec::DropCheck { name } => {
                drop_check(table, name, scope);
            }
            AlterSpec::DropConstraint { name } => {
                if table.find_check(name).is_some() {
                    drop_check(table, name, scope);
                } else if table
                    .index_position(name)
                    .is_some_and(|pos| table.indexes[pos].kind == IndexKind::Unique)
                {
                    drop_index(table, name, scope);
                } else {
                    scope.error(
                        DiagnosticCode::CheckNotFound,
                        format!("Constraint '{}' does not exist", name),
                    );
                }
            }
            AlterSpec::AlterCheck { name, enforced } => {
                alter_check_enforcement(table, name, *enforced, scope);
            }
            AlterSpec::RenameIndex { old_name, new_name } => {
                rename_index(table, old_name, new_name, scope)
            }
            AlterSpec::RenameTable { new_name } => self.rename_to(table, new_name, scope).await?,
        }
        Ok(())
    }

    /// RENAME TO inside ALTER TABLE
    async fn rename_to(
        &mut self,
        table: &mut TableInfo,
        new_name: &ObjectName,
        scope: &mut StatementScope,
    ) -> Result<(), CatalogError> {
        let Some(new_key) = self.resolve(new_name, scope) else {
            return Ok(());
        };
        let old_key = table.key();
        if new_key == old_key {
            return Ok(());
        }
        if table_exists(self.cache, self.db, &new_key).await? {
            scope.error(
                DiagnosticCode::TableExists,
                format!("Table '{}' already exists", new_key),
            );
            return Ok(());
        }

        table.rename(&new_key);
        scope
            .rollback
            .push_fragment(format!("RENAME TO {},", old_key.quoted()));
        Ok(())
    }
}

/// " FIRST" or " AFTER `prev`" for the column currently at `pos`
fn position_clause(table: &TableInfo, pos: usize) -> String {
    match pos.checked_sub(1).and_then(|prev| table.columns.get(prev)) {
        Some(prev) => format!(" AFTER {}", quote_ident(&prev.name)),
        None => " FIRST".to_string(),
    }
}

/// Insertion point for a column, `default` when no position is given
fn target_position(
    table: &TableInfo,
    position: Option<&ColumnPosition>,
    default: usize,
    scope: &mut StatementScope,
) -> Option<usize> {
    match position {
        None => Some(default),
        Some(ColumnPosition::First) => Some(0),
        Some(ColumnPosition::After(column)) => {
            let pos = table.column_position(column).map(|pos| pos + 1);
            if pos.is_none() {
                scope.error(
                    DiagnosticCode::ColumnNotFound,
                    format!("Unknown column '{}' in '{}'", column, table.name),
                );
            }
            pos
        }
    }
}

fn columns_exist(table: &TableInfo, columns: &[String], scope: &mut StatementScope) -> bool {
    let mut ok = true;
    for column in columns {
        if table.find_column(column).is_none() {
            scope.error(
                DiagnosticCode::ColumnNotFound,
                format!("Key column '{}' doesn't exist in table", column),
            );
            ok = false;
        }
    }
    ok
}

/// Name MySQL gives an unnamed index: its first column, suffixed on clash
fn default_index_name(table: &TableInfo, columns: &[String]) -> String {
    let base = columns.first().cloned().unwrap_or_default();
    if table.index_position(&base).is_none() {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{}_{}", base, suffix);
        if table.index_position(&candidate).is_none() {
            return candidate;
        }
        suffix += 1;
    }
}

/// Add a PRIMARY KEY, UNIQUE or INDEX definition; CHECKs are not keys
pub(super) fn add_key(
    table: &mut TableInfo,
    constraint: &TableConstraint,
    scope: &mut StatementScope,
) -> Option<IndexInfo> {
    match constraint {
        TableConstraint::PrimaryKey { columns } => {
            if table.primary_key().is_some() {
                scope.error(DiagnosticCode::IndexExists, "Multiple primary key defined");
                return None;
            }
            if !columns_exist(table, columns, scope) {
                return None;
            }
            for column in table
                .columns
                .iter_mut()
                .filter(|c| columns.iter().any(|k| k.eq_ignore_ascii_case(&c.name)))
            {
                column.nullable = false;
            }
            let index = IndexInfo::primary(columns.clone());
            table.indexes.insert(0, index.clone());
            Some(index)
        }
        TableConstraint::Unique { name, columns } | TableConstraint::Index { name, columns } => {
            let name = name
                .clone()
                .unwrap_or_else(|| default_index_name(table, columns));
            if table.index_position(&name).is_some() {
                scope.error(
                    DiagnosticCode::IndexExists,
                    format!("Duplicate key name '{}'", name),
                );
                return None;
            }
            if !columns_exist(table, columns, scope) {
                return None;
            }
            let index = match constraint {
                TableConstraint::Unique { .. } => IndexInfo::unique(name, columns.clone()),
                _ => IndexInfo::plain(name, columns.clone()),
            };
            table.indexes.push(index.clone());
            Some(index)
        }
        TableConstraint::Check(_) => None,
    }
}

/// Keys declared inline in a column definition
pub(super) fn add_inline_keys(
    table: &mut TableInfo,
    column: &ColumnSpec,
    scope: &mut StatementScope,
) -> Vec<IndexInfo> {
    let mut added = Vec::new();
    if column.is_primary_key() {
        let primary = TableConstraint::PrimaryKey {
            columns: vec![column.name.clone()],
        };
        added.extend(add_key(table, &primary, scope));
    }
    if column.is_unique() {
        let unique = TableConstraint::Unique {
            name: None,
            columns: vec![column.name.clone()],
        };
        added.extend(add_key(table, &unique, scope));
    }
    added
}

fn add_column(
    table: &mut TableInfo,
    column: &ColumnSpec,
    position: Option<&ColumnPosition>,
    scope: &mut StatementScope,
) {
    if table.find_column(&column.name).is_some() {
        scope.error(
            DiagnosticCode::ColumnExists,
            format!("Duplicate column name '{}'", column.name),
        );
        return;
    }
    let Some(pos) = target_position(table, position, table.columns.len(), scope) else {
        return;
    };

    table.columns.insert(pos, column.to_column_info());
    scope
        .rollback
        .push_fragment(format!("DROP COLUMN {},", quote_ident(&column.name)));

    let before = table.checks.len();
    attach_column_checks(table, &column.name, &column.options, scope);
    for check in &table.checks[before..] {
        scope.rollback.push_fragment(add_check_rollback(&check.name));
    }

    for index in add_inline_keys(table, column, scope) {
        scope.rollback.push_fragment(format!("{},", index.drop_clause()));
    }
}

fn drop_column(table: &mut TableInfo, name: &str, scope: &mut StatementScope) {
    let Some(pos) = table.column_position(name) else {
        scope.error(
            DiagnosticCode::ColumnNotFound,
            format!("Can't DROP '{}'; check that column/key exists", name),
        );
        return;
    };
    if !ensure_column_unreferenced(table, name, true, scope) {
        return;
    }
    let position = position_clause(table, pos);
    let column = table.columns.remove(pos);

    for check in remove_table_checks_on(table, &column.name) {
        scope.info(
            DiagnosticCode::CheckDropped,
            format!("DROP CHECK {}", quote_ident(&check.name)),
        );
        scope.rollback.push_fragment(drop_check_rollback(&check.name, &check));
    }

    // Indexes lose the column; an emptied index disappears with it
    for index in table.indexes.iter_mut() {
        if !index.columns.iter().any(|c| c.eq_ignore_ascii_case(&column.name)) {
            continue;
        }
        let original = index.clone();
        index.columns.retain(|c| !c.eq_ignore_ascii_case(&column.name));
        scope.rollback.push_fragment(format!("{},", original.add_clause()));
        if !index.columns.is_empty() {
            scope.rollback.push_fragment(format!("{},", index.drop_clause()));
        }
    }
    table.indexes.retain(|index| !index.columns.is_empty());

    let checks = table.remove_column_checks(&column.name);
    scope.rollback.push_fragment(format!(
        "ADD COLUMN {}{},",
        column.definition_with_checks(&checks),
        position
    ));
}

/// MODIFY (same name) and CHANGE (possibly renamed) COLUMN
fn change_column(
    table: &mut TableInfo,
    old_name: &str,
    column: &ColumnSpec,
    position: Option<&ColumnPosition>,
    scope: &mut StatementScope,
) {
    let Some(pos) = table.column_position(old_name) else {
        scope.error(
            DiagnosticCode::ColumnNotFound,
            format!("Unknown column '{}' in '{}'", old_name, table.name),
        );
        return;
    };
    let renamed = !old_name.eq_ignore_ascii_case(&column.name);
    if renamed && table.find_column(&column.name).is_some() {
        scope.error(
            DiagnosticCode::ColumnExists,
            format!("Duplicate column name '{}'", column.name),
        );
        return;
    }

    if renamed && !ensure_column_unreferenced(table, old_name, false, scope) {
        return;
    }

    let old_position = position_clause(table, pos);
    let old = table.columns.remove(pos);
    let Some(new_pos) = target_position(table, position, pos, scope) else {
        table.columns.insert(pos, old);
        return;
    };
    table.columns.insert(new_pos, column.to_column_info());

    let old_checks: Vec<CheckConstraintInfo> = table
        .checks
        .iter()
        .filter(|c| c.belongs_to(old_name))
        .cloned()
        .collect();
    if renamed {
        rename_index_columns(table, old_name, &column.name);
        table.rename_column_checks(old_name, &column.name);
    }
    let update = update_column_checks(table, &column.name, &column.options);
    if !update.is_unchanged(table) {
        for check in &old_checks {
            scope.rollback.push_fragment(drop_check_rollback(&check.name, check));
        }
        if let Some(added) = update.added {
            scope
                .rollback
                .push_fragment(add_check_rollback(&table.checks[added].name));
        }
    }

    let restore_position = if position.is_some() { old_position } else { String::new() };
    let fragment = if renamed {
        format!(
            "CHANGE COLUMN {} {}{},",
            quote_ident(&column.name),
            old.definition(),
            restore_position
        )
    } else {
        format!("MODIFY COLUMN {}{},", old.definition(), restore_position)
    };
    scope.rollback.push_fragment(fragment);
}

fn rename_column(table: &mut TableInfo, old_name: &str, new_name: &str, scope: &mut StatementScope) {
    let Some(pos) = table.column_position(old_name) else {
        scope.error(
            DiagnosticCode::ColumnNotFound,
            format!("Unknown column '{}' in '{}'", old_name, table.name),
        );
        return;
    };
    if !old_name.eq_ignore_ascii_case(new_name) && table.find_column(new_name).is_some() {
        scope.error(
            DiagnosticCode::ColumnExists,
            format!("Duplicate column name '{}'", new_name),
        );
        return;
    }
    if !ensure_column_unreferenced(table, old_name, false, scope) {
        return;
    }

    let old = std::mem::replace(&mut table.columns[pos].name, new_name.to_string());
    rename_index_columns(table, &old, new_name);
    table.rename_column_checks(&old, new_name);
    scope.rollback.push_fragment(format!(
        "RENAME COLUMN {} TO {},",
        quote_ident(new_name),
        quote_ident(&old)
    ));
}

fn rename_index_columns(table: &mut TableInfo, old: &str, new: &str) {
    for column in table
        .indexes
        .iter_mut()
        .flat_map(|index| index.columns.iter_mut())
        .filter(|c| c.eq_ignore_ascii_case(old))
    {
        *column = new.to_string();
    }
}

fn drop_index(table: &mut TableInfo, name: &str, scope: &mut StatementScope) {
    let Some(pos) = table.index_position(name) else {
        scope.error(
            DiagnosticCode::IndexNotFound,
            format!("Can't DROP '{}'; check that column/key exists", name),
        );
        return;
    };
    let index = table.indexes.remove(pos);
    scope.rollback.push_fragment(format!("{},", index.add_clause()));
}

fn rename_index(table: &mut TableInfo, old_name: &str, new_name: &str, scope: &mut StatementScope) {
    let Some(pos) = table.index_position(old_name) else {
        scope.error(
            DiagnosticCode::IndexNotFound,
            format!("Key '{}' doesn't exist in table '{}'", old_name, table.name),
        );
        return;
    };
    if table.indexes[pos].kind == IndexKind::Primary || new_name.eq_ignore_ascii_case(IndexInfo::PRIMARY) {
        scope.error(
            DiagnosticCode::IndexExists,
            format!("Incorrect index name '{}'", new_name),
        );
        return;
    }
    if table.index_position(new_name).is_some() {
        scope.error(
            DiagnosticCode::IndexExists,
            format!("Duplicate key name '{}'", new_name),
        );
        return;
    }

    table.indexes[pos].name = new_name.to_string();
    scope.rollback.push_fragment(format!(
        "RENAME INDEX {} TO {},",
        quote_ident(new_name),
        quote_ident(old_name)
    ));
}
