//! SQL parsing for the audit engine
//!
//! This crate handles:
//! - Splitting a batch into statements (quote- and comment-aware)
//! - Lowering MySQL statement text into the closed `AuditStatement` model
//! - Canonical printing of CHECK predicates
//! - Projection shapes of SELECT statements, for column-origin tracing
//!
//! Tokenizing and expression parsing go through sqlparser's MySQL dialect.
//! Statement structure is lowered here because MySQL CHECK syntax
//! (`[NOT] ENFORCED`, `ALTER CHECK`, `DROP CHECK`) is outside sqlparser's grammar.

pub mod ast;
mod cursor;
pub mod parser;
pub mod printer;
pub mod query;

pub use ast::{
    AlterSpec, AlterTable, AuditStatement, CheckClause, ColumnOption, ColumnPosition, ColumnSpec,
    CreateTable, DmlStatement, DropTable, ObjectName, RenameTable, TableConstraint,
};
pub use parser::{ParseError, ParseErrorKind, ParsedStatement, SqlParser};
pub use printer::{check_expression_columns, normalize_check_expression, render_expr};
pub use query::{
    parse_query_shape, ColumnRef, ProjectionItem, QueryShape, Relation, RelationSource, SelectShape,
};
