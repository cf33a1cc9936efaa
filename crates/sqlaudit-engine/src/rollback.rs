//! Per-statement rollback buffer
//!
//! ALTER TABLE handlers push one inverse fragment per sub-clause (each ending
//! in a comma); other handlers push whole inverse statements. At the
//! statement boundary everything is flushed into the rollback text, in
//! reverse order of application.

use sqlaudit_core::TableKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackBuffer {
    /// Table the ALTER fragments apply to (its name after the statement)
    target: Option<TableKey>,
    fragments: Vec<String>,
    statements: Vec<String>,
}

impl RollbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ALTER TABLE sub-clause inverse, e.g. "DROP CHECK `c`,"
    pub fn push_fragment(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// Append a complete inverse statement, terminated by ';'
    pub fn push_statement(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Table the flushed ALTER TABLE statement should name
    pub fn set_alter_target(&mut self, table: TableKey) {
        self.target = Some(table);
    }

    /// Fragments in push order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Whole statements in push order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.statements.is_empty()
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.fragments.clear();
        self.statements.clear();
    }

    /// Render the rollback text and empty the buffer
    ///
    /// Fragments become one `ALTER TABLE` statement with the trailing comma
    /// of the last fragment removed. Whole statements follow, newest first.
    pub fn flush(&mut self) -> String {
        let mut parts = Vec::new();

        if let Some(target) = &self.target {
            if !self.fragments.is_empty() {
                let mut body = self
                    .fragments
                    .iter()
                    .rev()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                if body.ends_with(',') {
                    body.pop();
                }
                parts.push(format!("ALTER TABLE {} {};", target.quoted(), body));
            }
        }
        parts.extend(self.statements.iter().rev().cloned());

        self.clear();
        parts.join("\n")
    }
}
