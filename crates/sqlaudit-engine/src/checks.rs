//! CHECK constraint lifecycle
//!
//! Attaching, dropping, re-enforcing and re-homing CHECK constraints on a
//! cached table, together with the ALTER TABLE fragments that undo each step.
//! Unnamed constraints are addressed by the `<table>_chk_<n>` name generated
//! when they were attached.

use crate::scope::StatementScope;
use sqlaudit_core::{quote_ident, CheckConstraintInfo, CheckLevel, DiagnosticCode, TableInfo};
use sqlaudit_sql::{check_expression_columns, CheckClause, ColumnOption};
use tracing::debug;

/// Fragment undoing the addition of check `name`
pub fn add_check_rollback(name: &str) -> String {
    format!("DROP CHECK {},", quote_ident(name))
}

/// Fragment re-creating a dropped check under `name`
pub fn drop_check_rollback(name: &str, check: &CheckConstraintInfo) -> String {
    let mut fragment = format!(
        "ADD CONSTRAINT {} CHECK ({})",
        quote_ident(name),
        check.expression
    );
    if !check.enforced {
        fragment.push_str(" NOT ENFORCED");
    }
    fragment.push(',');
    fragment
}

/// Fragment restoring the enforcement state a check had before an ALTER CHECK
pub fn alter_check_rollback(name: &str, restore_enforced: bool) -> String {
    let state = if restore_enforced { "ENFORCED" } else { "NOT ENFORCED" };
    format!("ALTER CHECK {} {},", quote_ident(name), state)
}

fn column_clauses(options: &[ColumnOption]) -> impl Iterator<Item = &CheckClause> {
    options.iter().filter_map(|option| match option {
        ColumnOption::Check(clause) => Some(clause),
        _ => None,
    })
}

/// Attach the CHECK options of a column definition as column-level checks
///
/// NOT ENFORCED on a column check is ignored. Returns how many were attached.
pub fn attach_column_checks(
    table: &mut TableInfo,
    column: &str,
    options: &[ColumnOption],
    scope: &mut StatementScope,
) -> usize {
    let mut attached = 0;
    for clause in column_clauses(options) {
        let name = clause.name.clone().unwrap_or_default();
        if !name.is_empty() && table.find_check(&name).is_some() {
            scope.error(
                DiagnosticCode::CheckExists,
                format!("Duplicate check constraint name '{}'", name),
            );
            continue;
        }

        let pos = table.push_check(CheckConstraintInfo::column(column, name, clause.expression()));
        scope.info(
            DiagnosticCode::CheckAttached,
            format!(
                "COLUMN {} CHECK constraint ({})",
                quote_ident(column),
                table.checks[pos].label()
            ),
        );
        attached += 1;
    }
    attached
}

/// Attach a table-level check; `context` names the owner, e.g. "TABLE `t`"
///
/// Returns the position of the new check.
pub fn add_table_check(
    table: &mut TableInfo,
    clause: &CheckClause,
    context: &str,
    scope: &mut StatementScope,
) -> Option<usize> {
    let name = clause.name.clone().unwrap_or_default();
    if !name.is_empty() && table.find_check(&name).is_some() {
        scope.error(
            DiagnosticCode::CheckExists,
            format!("Duplicate check constraint name '{}'", name),
        );
        return None;
    }

    let pos = table.push_check(CheckConstraintInfo::table(
        name,
        clause.expression(),
        clause.enforced,
    ));
    let label = table.checks[pos].label();
    scope.info(
        DiagnosticCode::CheckAttached,
        format!("{} CHECK constraint ({})", context, label),
    );
    if !clause.enforced {
        scope.warn(
            DiagnosticCode::CheckNotEnforced,
            format!(
                "{} CHECK constraint ({}) is [NOT ENFORCED] and will not reject rows",
                context, label
            ),
        );
    }
    Some(pos)
}

/// ALTER CHECK `name` [NOT] ENFORCED
pub fn alter_check_enforcement(
    table: &mut TableInfo,
    name: &str,
    enforced: bool,
    scope: &mut StatementScope,
) -> bool {
    let Some(pos) = table.find_check(name) else {
        scope.error(
            DiagnosticCode::CheckNotFound,
            format!("Check constraint '{}' is not found in the table", name),
        );
        return false;
    };

    let check = &mut table.checks[pos];
    if check.level == CheckLevel::Column && !enforced {
        scope.error(
            DiagnosticCode::ColumnCheckAlwaysEnforced,
            format!("Column check constraint '{}' cannot be NOT ENFORCED", name),
        );
        return false;
    }
    let previous = check.enforced;
    check.enforced = enforced;

    let addressable = check.name.clone();
    scope.info(
        DiagnosticCode::CheckEnforcementChanged,
        format!(
            "ALTER CHECK {} {}",
            quote_ident(&addressable),
            if enforced { "ENFORCED" } else { "NOT ENFORCED" }
        ),
    );
    scope.rollback.push_fragment(alter_check_rollback(&addressable, previous));
    true
}

/// DROP CHECK `name`
pub fn drop_check(
    table: &mut TableInfo,
    name: &str,
    scope: &mut StatementScope,
) -> Option<CheckConstraintInfo> {
    let Some(pos) = table.find_check(name) else {
        scope.error(
            DiagnosticCode::CheckNotFound,
            format!("Check constraint '{}' is not found in the table", name),
        );
        return None;
    };

    let check = table.checks.remove(pos);
    scope.info(
        DiagnosticCode::CheckDropped,
        format!("DROP CHECK {}", quote_ident(&check.name)),
    );
    scope.rollback.push_fragment(drop_check_rollback(&check.name, &check));
    Some(check)
}

fn table_check_columns(check: &CheckConstraintInfo) -> Vec<String> {
    check_expression_columns(&check.expression).unwrap_or_else(|e| {
        debug!("Cannot list columns of CHECK {}: {}", check.name, e);
        Vec::new()
    })
}

/// Refuse to drop or rename `column` while a table-level check reads it
///
/// With `solo_allowed`, a check reading nothing but `column` does not block;
/// it is dropped along with the column instead. Returns false after
/// reporting the blocking check.
pub fn ensure_column_unreferenced(
    table: &TableInfo,
    column: &str,
    solo_allowed: bool,
    scope: &mut StatementScope,
) -> bool {
    let blocking = table
        .checks
        .iter()
        .filter(|check| check.level == CheckLevel::Table)
        .find(|check| {
            let columns = table_check_columns(check);
            let reads = columns.iter().any(|c| c.eq_ignore_ascii_case(column));
            reads && !(solo_allowed && columns.len() == 1)
        });
    let Some(check) = blocking else {
        return true;
    };
    scope.error(
        DiagnosticCode::CheckDependsOnColumn,
        format!(
            "Check constraint '{}' uses column '{}', hence column cannot be dropped or renamed.",
            check.name, column
        ),
    );
    false
}

/// Remove table-level checks that read `column` and nothing else
pub fn remove_table_checks_on(table: &mut TableInfo, column: &str) -> Vec<CheckConstraintInfo> {
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.checks)
        .into_iter()
        .partition(|check| {
            check.level == CheckLevel::Table
                && matches!(
                    table_check_columns(check).as_slice(),
                    [only] if only.eq_ignore_ascii_case(column)
                )
        });
    table.checks = kept;
    removed
}

/// Outcome of replacing a column's checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCheckUpdate {
    /// Checks the column had before
    pub removed: Vec<CheckConstraintInfo>,

    /// Position of the replacement, if the new definition carries one
    pub added: Option<usize>,
}

impl ColumnCheckUpdate {
    /// Whether the column ends up with exactly what it had
    pub fn is_unchanged(&self, table: &TableInfo) -> bool {
        match (self.removed.as_slice(), self.added) {
            ([], None) => true,
            ([old], Some(pos)) => table.checks.get(pos) == Some(old),
            _ => false,
        }
    }
}

/// Replace the column's checks with the first CHECK of its new definition
///
/// An unnamed replacement inherits the name (declared or generated) of the
/// first removed check. The replacement takes the slot of that check.
pub fn update_column_checks(
    table: &mut TableInfo,
    column: &str,
    options: &[ColumnOption],
) -> ColumnCheckUpdate {
    let slot = table.checks.iter().position(|c| c.belongs_to(column));
    let removed = table.remove_column_checks(column);

    let added = column_clauses(options).next().map(|clause| {
        let mut check = CheckConstraintInfo::column(column, "", clause.expression());
        match (&clause.name, removed.first()) {
            (Some(name), _) => check.name = name.clone(),
            (None, Some(previous)) => {
                check.name = previous.name.clone();
                check.generated = previous.generated;
            }
            (None, None) => {}
        }
        table.insert_check(slot.unwrap_or(table.checks.len()), check)
    });

    ColumnCheckUpdate { removed, added }
}
