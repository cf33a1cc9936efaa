//! Table metadata mirrored by the session schema cache
//!
//! `TableInfo` is the in-memory image of one live table. Handlers mutate it in
//! place while auditing DDL, so every type here renders back to MySQL text
//! (column definitions, index clauses, `SHOW CREATE TABLE`-style output).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote an identifier with backticks, doubling embedded backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes, doubling embedded quotes
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Identity of a table: `schema.name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    /// Database (schema) name
    pub schema: String,

    /// Table name
    pub name: String,
}

impl TableKey {
    /// Create a new table key
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Cache key form (`schema.name`)
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Backtick-quoted form used in generated SQL
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Where a CHECK constraint was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckLevel {
    /// Declared inline in a column definition
    Column,

    /// Declared as a table constraint
    Table,
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column => write!(f, "COLUMN"),
            Self::Table => write!(f, "TABLE"),
        }
    }
}

/// A CHECK constraint attached to a table
///
/// Column-level checks are always enforced. `expression` holds the canonical
/// printer output, so two equal predicates compare equal as strings.
///
/// An unnamed check is given a `<table>_chk_<n>` name once, when it joins a
/// [`TableInfo`], and keeps it for its lifetime, as MySQL does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckConstraintInfo {
    /// Constraint name; empty until an unnamed check joins a table
    #[serde(default)]
    pub name: String,

    /// Whether `name` was generated rather than declared
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,

    /// Canonical predicate text
    pub expression: String,

    /// Declaration level
    pub level: CheckLevel,

    /// Owning column, set iff `level` is `Column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,

    /// Whether the predicate is validated on writes
    pub enforced: bool,
}

impl CheckConstraintInfo {
    /// Create a column-level check (always enforced)
    pub fn column(column: impl Into<String>, name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generated: false,
            expression: expression.into(),
            level: CheckLevel::Column,
            column_name: Some(column.into()),
            enforced: true,
        }
    }

    /// Create a table-level check
    pub fn table(name: impl Into<String>, expression: impl Into<String>, enforced: bool) -> Self {
        Self {
            name: name.into(),
            generated: false,
            expression: expression.into(),
            level: CheckLevel::Table,
            column_name: None,
            enforced,
        }
    }

    /// Whether the constraint carries a declared name
    pub fn is_named(&self) -> bool {
        !self.name.is_empty() && !self.generated
    }

    /// Name shown in diagnostics: the declared name or "unnamed"
    pub fn label(&self) -> &str {
        if self.is_named() {
            &self.name
        } else {
            "unnamed"
        }
    }

    /// Whether this is a column-level check owned by `column`
    pub fn belongs_to(&self, column: &str) -> bool {
        self.column_name
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column))
    }

    /// Inline clause used inside a column definition
    ///
    /// A generated name is spelled out so re-adding the check restores it.
    pub fn inline_clause(&self) -> String {
        if !self.name.is_empty() {
            format!("CONSTRAINT {} CHECK ({})", quote_ident(&self.name), self.expression)
        } else {
            format!("CHECK ({})", self.expression)
        }
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Rendered data type, e.g. `VARCHAR(20)`
    pub data_type: String,

    /// Whether NULL is allowed
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Rendered default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// AUTO_INCREMENT flag
    #[serde(default)]
    pub auto_increment: bool,

    /// Column comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnInfo {
    /// Create a nullable column with no default
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            auto_increment: false,
            comment: None,
        }
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the rendered default value
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set AUTO_INCREMENT
    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Full column definition without CHECK clauses
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.data_type);
        def.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        if self.auto_increment {
            def.push_str(" AUTO_INCREMENT");
        }
        if let Some(comment) = &self.comment {
            def.push_str(" COMMENT ");
            def.push_str(&quote_string(comment));
        }
        def
    }

    /// Column definition followed by the given inline CHECK clauses
    pub fn definition_with_checks<'a>(
        &self,
        checks: impl IntoIterator<Item = &'a CheckConstraintInfo>,
    ) -> String {
        let mut def = self.definition();
        for check in checks {
            def.push(' ');
            def.push_str(&check.inline_clause());
        }
        def
    }
}

/// Index flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

/// An index on the table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name (`PRIMARY` for the primary key)
    pub name: String,

    /// Index flavour
    pub kind: IndexKind,

    /// Indexed columns in key order
    pub columns: Vec<String>,
}

impl IndexInfo {
    /// Name MySQL gives the primary key
    pub const PRIMARY: &'static str = "PRIMARY";

    /// Create a primary key
    pub fn primary(columns: Vec<String>) -> Self {
        Self {
            name: Self::PRIMARY.to_string(),
            kind: IndexKind::Primary,
            columns,
        }
    }

    /// Create a unique index
    pub fn unique(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Unique,
            columns,
        }
    }

    /// Create a plain secondary index
    pub fn plain(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Index,
            columns,
        }
    }

    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `ALTER TABLE ... ADD` sub-clause (without trailing comma)
    pub fn add_clause(&self) -> String {
        match self.kind {
            IndexKind::Primary => format!("ADD PRIMARY KEY({})", self.column_list()),
            IndexKind::Unique => format!("ADD UNIQUE INDEX {}({})", quote_ident(&self.name), self.column_list()),
            IndexKind::Index => format!("ADD INDEX {}({})", quote_ident(&self.name), self.column_list()),
        }
    }

    /// `ALTER TABLE ... DROP` sub-clause (without trailing comma)
    pub fn drop_clause(&self) -> String {
        match self.kind {
            IndexKind::Primary => "DROP PRIMARY KEY".to_string(),
            _ => format!("DROP INDEX {}", quote_ident(&self.name)),
        }
    }

    /// Line inside a `CREATE TABLE` body
    pub fn create_clause(&self) -> String {
        match self.kind {
            IndexKind::Primary => format!("PRIMARY KEY ({})", self.column_list()),
            IndexKind::Unique => format!("UNIQUE KEY {} ({})", quote_ident(&self.name), self.column_list()),
            IndexKind::Index => format!("KEY {} ({})", quote_ident(&self.name), self.column_list()),
        }
    }
}

/// A table option such as `ENGINE=InnoDB`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableOption {
    pub name: String,
    pub value: String,
}

/// Cached definition of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Owning database
    pub schema: String,

    /// Table name
    pub name: String,

    /// Ordered column definitions
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,

    /// Indexes, primary key first when present
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,

    /// CHECK constraints in declaration order
    #[serde(default)]
    pub checks: Vec<CheckConstraintInfo>,

    /// Table options in declaration order
    #[serde(default)]
    pub options: Vec<TableOption>,
}

impl TableInfo {
    /// Create an empty table definition
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Add columns (builder style)
    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    /// Add an index (builder style)
    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a check constraint (builder style)
    pub fn with_check(mut self, check: CheckConstraintInfo) -> Self {
        self.push_check(check);
        self
    }

    /// Identity key
    pub fn key(&self) -> TableKey {
        TableKey::new(self.schema.clone(), self.name.clone())
    }

    /// Find a column by name (case-insensitive, as MySQL does)
    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Position of a column
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of an index by name
    pub fn index_position(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The primary key, if any
    pub fn primary_key(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.kind == IndexKind::Primary)
    }

    fn generated_prefix(&self) -> String {
        format!("{}_chk_", self.name)
    }

    /// Suffix `n` of a `<table>_chk_<n>` name, compared case-insensitively
    fn generated_suffix(&self, name: &str) -> Option<u32> {
        let prefix = self.generated_prefix();
        name.get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(&prefix))
            .and_then(|_| name[prefix.len()..].parse().ok())
    }

    /// Name the next unnamed check receives: one past the highest suffix in use
    pub fn next_generated_check_name(&self) -> String {
        let last = self
            .checks
            .iter()
            .filter_map(|c| self.generated_suffix(&c.name))
            .max()
            .unwrap_or(0);
        format!("{}{}", self.generated_prefix(), last + 1)
    }

    /// Append a check, generating its name if it has none; returns its position
    pub fn push_check(&mut self, check: CheckConstraintInfo) -> usize {
        let pos = self.checks.len();
        self.insert_check(pos, check)
    }

    /// Insert a check at `pos` (clamped), generating its name if it has none
    pub fn insert_check(&mut self, pos: usize, mut check: CheckConstraintInfo) -> usize {
        if check.name.is_empty() {
            check.name = self.next_generated_check_name();
            check.generated = true;
        }
        let pos = pos.min(self.checks.len());
        self.checks.insert(pos, check);
        pos
    }

    /// Generate names for checks loaded without one, in declaration order
    pub fn assign_check_names(&mut self) {
        for pos in 0..self.checks.len() {
            if self.checks[pos].name.is_empty() {
                let name = self.next_generated_check_name();
                let check = &mut self.checks[pos];
                check.name = name;
                check.generated = true;
            }
        }
    }

    /// Locate a check by name (case-insensitive)
    pub fn find_check(&self, name: &str) -> Option<usize> {
        self.checks.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Move the table to `key`
    ///
    /// Generated check names follow the table name, as MySQL renames them.
    pub fn rename(&mut self, key: &TableKey) {
        let renamed: Vec<Option<u32>> = self
            .checks
            .iter()
            .map(|c| if c.generated { self.generated_suffix(&c.name) } else { None })
            .collect();

        self.schema = key.schema.clone();
        self.name = key.name.clone();
        let prefix = self.generated_prefix();
        for (check, suffix) in self.checks.iter_mut().zip(renamed) {
            if let Some(n) = suffix {
                check.name = format!("{}{}", prefix, n);
            }
        }
    }

    /// Column-level checks owned by `column`
    pub fn column_checks(&self, column: &str) -> Vec<&CheckConstraintInfo> {
        self.checks.iter().filter(|c| c.belongs_to(column)).collect()
    }

    /// Remove and return every column-level check owned by `column`
    ///
    /// The remaining checks keep their relative order.
    pub fn remove_column_checks(&mut self, column: &str) -> Vec<CheckConstraintInfo> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.checks)
            .into_iter()
            .partition(|c| c.belongs_to(column));
        self.checks = kept;
        removed
    }

    /// Point every column-level check owned by `old` at `new`
    pub fn rename_column_checks(&mut self, old: &str, new: &str) {
        for check in self.checks.iter_mut().filter(|c| c.belongs_to(old)) {
            check.column_name = Some(new.to_string());
        }
    }

    /// Render a `CREATE TABLE` statement for this definition
    pub fn render_create(&self) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(|c| c.definition()).collect();
        lines.extend(self.indexes.iter().map(|i| i.create_clause()));
        for check in &self.checks {
            let mut line = format!(
                "CONSTRAINT {} CHECK ({})",
                quote_ident(&check.name),
                check.expression
            );
            if !check.enforced {
                line.push_str(" NOT ENFORCED");
            }
            lines.push(line);
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.key().quoted(),
            lines.join(",\n  ")
        );
        for option in &self.options {
            sql.push_str(&format!(" {}={}", option.name, option.value));
        }
        sql.push(';');
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableInfo {
        TableInfo::new("test", "users")
            .with_columns(vec![
                ColumnInfo::new("id", "INT").with_nullable(false).with_auto_increment(true),
                ColumnInfo::new("age", "INT"),
            ])
            .with_index(IndexInfo::primary(vec!["id".to_string()]))
            .with_check(CheckConstraintInfo::column("age", "", "`age`>=18"))
            .with_check(CheckConstraintInfo::table("chk_id", "`id`>0", false))
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("a`b"), "`a``b`");
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(TableKey::new("db", "t").quoted(), "`db`.`t`");
    }

    #[test]
    fn column_definition() {
        let col = ColumnInfo::new("name", "VARCHAR(20)")
            .with_nullable(false)
            .with_default("''")
            .with_comment("user name");
        assert_eq!(
            col.definition(),
            "`name` VARCHAR(20) NOT NULL DEFAULT '' COMMENT 'user name'"
        );
    }

    #[test]
    fn find_check_by_generated_name() {
        let table = sample_table();
        assert_eq!(table.find_check("chk_id"), Some(1));
        assert_eq!(table.find_check("users_chk_1"), Some(0));
        assert_eq!(table.find_check("USERS_CHK_1"), Some(0));
        assert_eq!(table.find_check("users_chk_2"), None);
        assert!(table.checks[0].generated);
        assert!(!table.checks[0].is_named());
        assert_eq!(table.checks[0].label(), "unnamed");
    }

    #[test]
    fn generated_names_survive_removal() {
        let mut table = TableInfo::new("test", "t")
            .with_check(CheckConstraintInfo::column("a", "", "`a`>0"))
            .with_check(CheckConstraintInfo::column("b", "", "`b`>0"));
        assert_eq!(table.checks[1].name, "t_chk_2");

        table.checks.remove(0);
        assert_eq!(table.find_check("t_chk_1"), None);
        assert_eq!(table.find_check("t_chk_2"), Some(0));

        let pos = table.push_check(CheckConstraintInfo::table("", "`c`>0", true));
        assert_eq!(table.checks[pos].name, "t_chk_3");
    }

    #[test]
    fn loaded_checks_get_names_in_order() {
        let mut table = TableInfo::new("test", "t");
        table.checks = vec![
            CheckConstraintInfo::table("t_chk_4", "`a`>0", true),
            CheckConstraintInfo::column("b", "", "`b`>0"),
        ];
        table.assign_check_names();
        assert_eq!(table.checks[1].name, "t_chk_5");
        assert!(!table.checks[0].generated);
    }

    #[test]
    fn rename_carries_generated_names() {
        let mut table = sample_table();
        table.rename(&TableKey::new("test", "members"));
        assert_eq!(table.key(), TableKey::new("test", "members"));
        assert_eq!(table.checks[0].name, "members_chk_1");
        assert_eq!(table.checks[1].name, "chk_id");
    }

    #[test]
    fn remove_column_checks_is_idempotent() {
        let mut table = sample_table();
        let removed = table.remove_column_checks("age");
        assert_eq!(removed.len(), 1);
        assert_eq!(table.checks.len(), 1);
        assert!(table.remove_column_checks("age").is_empty());
    }

    #[test]
    fn render_create_table() {
        let table = sample_table();
        let sql = table.render_create();
        assert!(sql.starts_with("CREATE TABLE `test`.`users` ("));
        assert!(sql.contains("`id` INT NOT NULL AUTO_INCREMENT"));
        assert!(sql.contains("PRIMARY KEY (`id`)"));
        assert!(sql.contains("CONSTRAINT `users_chk_1` CHECK (`age`>=18)"));
        assert!(sql.contains("CONSTRAINT `chk_id` CHECK (`id`>0) NOT ENFORCED"));
        assert!(sql.ends_with(");"));
    }

    #[test]
    fn index_clauses() {
        let idx = IndexInfo::unique("uk_email", vec!["email".to_string()]);
        assert_eq!(idx.add_clause(), "ADD UNIQUE INDEX `uk_email`(`email`)");
        assert_eq!(idx.drop_clause(), "DROP INDEX `uk_email`");
        assert_eq!(IndexInfo::primary(vec!["id".into()]).drop_clause(), "DROP PRIMARY KEY");
    }
}
