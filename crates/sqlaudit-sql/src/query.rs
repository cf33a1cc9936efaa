//! Projection shape of a SELECT
//!
//! Lowers a query into what is needed to trace each output column back to
//! the base-table columns it reads: the FROM relations in order, and for each
//! select item either a wildcard or the column references of its expression.

use crate::ast::ObjectName;
use crate::parser::ParseError;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// A column reference, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

/// One entry of a select list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionItem {
    /// `*`
    Wildcard,

    /// `a.*`
    QualifiedWildcard(String),

    /// Any expression, with the name its output column gets
    Expr { alias: String, columns: Vec<ColumnRef> },
}

/// Where a FROM relation's rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationSource {
    Table(ObjectName),
    Derived(Box<QueryShape>),
}

/// A FROM relation (joins flattened, left to right)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub source: RelationSource,
    pub alias: Option<String>,
}

impl Relation {
    /// Whether `qualifier` names this relation (its alias, else its table name)
    pub fn answers_to(&self, qualifier: &str) -> bool {
        match (&self.alias, &self.source) {
            (Some(alias), _) => alias.eq_ignore_ascii_case(qualifier),
            (None, RelationSource::Table(name)) => name.name.eq_ignore_ascii_case(qualifier),
            (None, RelationSource::Derived(_)) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectShape {
    pub relations: Vec<Relation>,
    pub items: Vec<ProjectionItem>,
}

/// A query: one branch per SELECT of a UNION chain, left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    pub branches: Vec<SelectShape>,
}

impl QueryShape {
    /// Every base table read, derived tables included, in FROM order
    pub fn tables(&self) -> Vec<&ObjectName> {
        let mut tables = Vec::new();
        for relation in self.branches.iter().flat_map(|b| &b.relations) {
            match &relation.source {
                RelationSource::Table(name) => tables.push(name),
                RelationSource::Derived(query) => tables.extend(query.tables()),
            }
        }
        tables
    }
}

/// Parse a single SELECT statement into its projection shape
pub fn parse_query_shape(sql: &str) -> Result<QueryShape, ParseError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
    if statements.len() != 1 {
        return Err(ParseError::syntax(format!(
            "expected one statement, found {}",
            statements.len()
        )));
    }
    match statements.remove(0) {
        Statement::Query(query) => lower_query(&query),
        other => Err(ParseError::unsupported(format!(
            "only SELECT has a projection, got {}",
            first_word(&other.to_string())
        ))),
    }
}

fn first_word(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_uppercase()
}

fn lower_query(query: &Query) -> Result<QueryShape, ParseError> {
    let mut branches = Vec::new();
    lower_set_expr(&query.body, &mut branches)?;
    Ok(QueryShape { branches })
}

fn lower_set_expr(body: &SetExpr, branches: &mut Vec<SelectShape>) -> Result<(), ParseError> {
    match body {
        SetExpr::Select(select) => {
            branches.push(lower_select(select)?);
            Ok(())
        }
        SetExpr::Query(query) => lower_set_expr(&query.body, branches),
        SetExpr::SetOperation { left, right, .. } => {
            lower_set_expr(left, branches)?;
            lower_set_expr(right, branches)
        }
        other => Err(ParseError::unsupported(format!(
            "query body {} has no projection",
            first_word(&other.to_string())
        ))),
    }
}

fn lower_select(select: &Select) -> Result<SelectShape, ParseError> {
    let mut relations = Vec::new();
    for from in &select.from {
        lower_from(from, &mut relations)?;
    }

    let items = select
        .projection
        .iter()
        .map(|item| match item {
            SelectItem::Wildcard(_) => ProjectionItem::Wildcard,
            SelectItem::QualifiedWildcard(name, _) => ProjectionItem::QualifiedWildcard(
                name.0.last().map(|i| i.value.clone()).unwrap_or_default(),
            ),
            SelectItem::UnnamedExpr(expr) => ProjectionItem::Expr {
                alias: default_alias(expr),
                columns: column_refs(expr),
            },
            SelectItem::ExprWithAlias { expr, alias } => ProjectionItem::Expr {
                alias: alias.value.clone(),
                columns: column_refs(expr),
            },
        })
        .collect();

    Ok(SelectShape { relations, items })
}

fn lower_from(from: &TableWithJoins, relations: &mut Vec<Relation>) -> Result<(), ParseError> {
    lower_factor(&from.relation, relations)?;
    for join in &from.joins {
        lower_factor(&join.relation, relations)?;
    }
    Ok(())
}

fn lower_factor(factor: &TableFactor, relations: &mut Vec<Relation>) -> Result<(), ParseError> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let mut parts = name.0.iter().map(|i| i.value.clone()).rev();
            let table = parts.next().unwrap_or_default();
            relations.push(Relation {
                source: RelationSource::Table(ObjectName {
                    schema: parts.next(),
                    name: table,
                }),
                alias: alias.as_ref().map(|a| a.name.value.clone()),
            });
        }
        TableFactor::Derived { subquery, alias, .. } => relations.push(Relation {
            source: RelationSource::Derived(Box::new(lower_query(subquery)?)),
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        }),
        TableFactor::NestedJoin { table_with_joins, .. } => {
            lower_from(table_with_joins, relations)?
        }
        other => {
            return Err(ParseError::unsupported(format!("FROM item {} is not traced", other)));
        }
    }
    Ok(())
}

/// Name MySQL gives an unaliased select item
fn default_alias(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => {
            idents.last().map(|i| i.value.clone()).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

fn column_refs(expr: &Expr) -> Vec<ColumnRef> {
    let mut refs = Vec::new();
    collect_refs(expr, &mut refs);
    refs
}

fn collect_refs(expr: &Expr, refs: &mut Vec<ColumnRef>) {
    match expr {
        Expr::Identifier(ident) => refs.push(ColumnRef {
            qualifier: None,
            name: ident.value.clone(),
        }),
        Expr::CompoundIdentifier(idents) => {
            let mut parts = idents.iter().rev();
            if let Some(column) = parts.next() {
                refs.push(ColumnRef {
                    qualifier: parts.next().map(|i| i.value.clone()),
                    name: column.value.clone(),
                });
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::Cast { expr, .. }
        | Expr::Extract { expr, .. }
        | Expr::Collate { expr, .. } => collect_refs(expr, refs),
        Expr::Between { expr, low, high, .. } => {
            for e in [expr, low, high] {
                collect_refs(e, refs);
            }
        }
        Expr::InList { expr, list, .. } => {
            collect_refs(expr, refs);
            for e in list {
                collect_refs(e, refs);
            }
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::RLike { expr, pattern, .. } => {
            collect_refs(expr, refs);
            collect_refs(pattern, refs);
        }
        Expr::Substring { expr, substring_from, substring_for, .. } => {
            collect_refs(expr, refs);
            for e in substring_from.iter().chain(substring_for.iter()) {
                collect_refs(e, refs);
            }
        }
        Expr::Case { operand, conditions, results, else_result } => {
            if let Some(operand) = operand {
                collect_refs(operand, refs);
            }
            for e in conditions.iter().chain(results.iter()) {
                collect_refs(e, refs);
            }
            if let Some(else_result) = else_result {
                collect_refs(else_result, refs);
            }
        }
        Expr::Tuple(items) => {
            for e in items {
                collect_refs(e, refs);
            }
        }
        Expr::Interval(interval) => collect_refs(&interval.value, refs),
        Expr::Function(func) => {
            let FunctionArguments::List(list) = &func.args else {
                return;
            };
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                    | FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => {
                        collect_refs(e, refs)
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}
