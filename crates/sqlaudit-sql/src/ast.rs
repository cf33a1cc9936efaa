//! Closed statement model
//!
//! Every audited statement lowers into one `AuditStatement` variant, so the
//! engine dispatches with a single exhaustive `match`.

use crate::printer::render_expr;
use sqlaudit_core::{quote_ident, ColumnInfo, TableKey, TableOption};
use sqlparser::ast::Expr;
use std::fmt;

/// Possibly schema-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
        }
    }

    /// Resolve against the session's default schema
    ///
    /// Returns `None` for an unqualified name when no schema is selected.
    pub fn resolve(&self, default_schema: Option<&str>) -> Option<TableKey> {
        let schema = self.schema.as_deref().or(default_schema)?;
        Some(TableKey::new(schema, self.name.clone()))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => write!(f, "{}", quote_ident(&self.name)),
        }
    }
}

/// A `[CONSTRAINT name] CHECK (expr) [[NOT] ENFORCED]` clause
#[derive(Debug, Clone, PartialEq)]
pub struct CheckClause {
    pub name: Option<String>,
    pub expr: Expr,
    pub enforced: bool,
}

impl CheckClause {
    /// Canonical predicate text
    pub fn expression(&self) -> String {
        render_expr(&self.expr)
    }
}

/// One option in a column definition
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOption {
    Null,
    NotNull,
    /// Rendered default value
    Default(String),
    AutoIncrement,
    PrimaryKey,
    Unique,
    Comment(String),
    Check(CheckClause),
    OnUpdate(String),
    Collate(String),
}

/// `FIRST` / `AFTER col` placement for ADD, MODIFY and CHANGE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPosition {
    First,
    After(String),
}

/// A column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    /// Rendered data type, e.g. `DECIMAL(10,2) UNSIGNED`
    pub data_type: String,
    pub options: Vec<ColumnOption>,
}

impl ColumnSpec {
    /// CHECK clauses in declaration order
    pub fn checks(&self) -> impl Iterator<Item = &CheckClause> {
        self.options.iter().filter_map(|opt| match opt {
            ColumnOption::Check(check) => Some(check),
            _ => None,
        })
    }

    pub fn is_primary_key(&self) -> bool {
        self.options.contains(&ColumnOption::PrimaryKey)
    }

    pub fn is_unique(&self) -> bool {
        self.options.contains(&ColumnOption::Unique)
    }

    /// Cache representation of this column (CHECK clauses excluded)
    ///
    /// A `PRIMARY KEY` column is implicitly `NOT NULL`.
    pub fn to_column_info(&self) -> ColumnInfo {
        let mut column = ColumnInfo::new(self.name.clone(), self.data_type.clone());
        if self.is_primary_key() {
            column.nullable = false;
        }
        for option in &self.options {
            match option {
                ColumnOption::Null => column.nullable = true,
                ColumnOption::NotNull => column.nullable = false,
                ColumnOption::Default(value) => column.default = Some(value.clone()),
                ColumnOption::AutoIncrement => column.auto_increment = true,
                ColumnOption::Comment(text) => column.comment = Some(text.clone()),
                ColumnOption::PrimaryKey
                | ColumnOption::Unique
                | ColumnOption::Check(_)
                | ColumnOption::OnUpdate(_)
                | ColumnOption::Collate(_) => {}
            }
        }
        column
    }
}

/// A table-level constraint or index definition
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey { columns: Vec<String> },
    Unique { name: Option<String>, columns: Vec<String> },
    Index { name: Option<String>, columns: Vec<String> },
    Check(CheckClause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: ObjectName,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnSpec>,
    pub constraints: Vec<TableConstraint>,
    pub options: Vec<TableOption>,
    /// `CREATE TABLE t LIKE source`
    pub like: Option<ObjectName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    pub names: Vec<ObjectName>,
    pub if_exists: bool,
}

/// One `ALTER TABLE` sub-clause
#[derive(Debug, Clone, PartialEq)]
pub enum AlterSpec {
    AddColumn { column: ColumnSpec, position: Option<ColumnPosition> },
    DropColumn { name: String },
    ModifyColumn { column: ColumnSpec, position: Option<ColumnPosition> },
    ChangeColumn { old_name: String, column: ColumnSpec, position: Option<ColumnPosition> },
    RenameColumn { old_name: String, new_name: String },
    AddConstraint(TableConstraint),
    DropIndex { name: String },
    DropPrimaryKey,
    DropCheck { name: String },
    /// `DROP CONSTRAINT` may name a CHECK or a unique index
    DropConstraint { name: String },
    AlterCheck { name: String, enforced: bool },
    RenameIndex { old_name: String, new_name: String },
    RenameTable { new_name: ObjectName },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub name: ObjectName,
    pub specs: Vec<AlterSpec>,
}

/// `RENAME TABLE a TO b [, c TO d]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTable {
    pub pairs: Vec<(ObjectName, ObjectName)>,
}

/// Target of an INSERT, UPDATE or DELETE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmlStatement {
    pub table: ObjectName,
    /// Explicit INSERT column list (empty otherwise)
    pub columns: Vec<String>,
    pub has_where: bool,
}

/// Closed set of audited statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum AuditStatement {
    Use { database: String },
    CreateTable(CreateTable),
    DropTable(DropTable),
    AlterTable(AlterTable),
    RenameTable(RenameTable),
    TruncateTable(ObjectName),
    Insert(DmlStatement),
    Update(DmlStatement),
    Delete(DmlStatement),
    Query,
}

impl AuditStatement {
    /// Short statement kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Use { .. } => "USE",
            Self::CreateTable(_) => "CREATE TABLE",
            Self::DropTable(_) => "DROP TABLE",
            Self::AlterTable(_) => "ALTER TABLE",
            Self::RenameTable(_) => "RENAME TABLE",
            Self::TruncateTable(_) => "TRUNCATE TABLE",
            Self::Insert(_) => "INSERT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Query => "SELECT",
        }
    }

    /// Whether the statement writes data rows
    pub fn is_dml(&self) -> bool {
        matches!(self, Self::Insert(_) | Self::Update(_) | Self::Delete(_))
    }
}
