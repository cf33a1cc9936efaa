//! Column origins of a SELECT
//!
//! Traces every output column of a query back to the base-table columns it
//! reads, so a client can decide which result columns need masking. Tables
//! are read from the session's schema cache.

use crate::cache::{LookupError, SchemaCache};
use serde::{Deserialize, Serialize};
use sqlaudit_sql::{
    ColumnRef, ParseError, ProjectionItem, QueryShape, Relation, RelationSource, SelectShape,
};

/// One base column behind one output column
///
/// An output column computed from several columns appears once per column,
/// all entries sharing its `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingField {
    /// 0-based output column position; UNION branches continue the count
    pub index: usize,

    /// Base column name
    pub field: String,

    /// Base column type
    #[serde(rename = "type")]
    pub data_type: String,

    pub table: String,

    pub schema: String,

    /// Name of the output column
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaskingError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{0}' in 'field list'")]
    UnknownColumn(String),

    #[error("No tables used")]
    NoTablesUsed,
}

#[derive(Debug, Clone)]
struct Origin {
    field: String,
    data_type: String,
    table: String,
    schema: String,
}

/// An output column and the base columns behind it
#[derive(Debug, Clone)]
struct Traced {
    name: String,
    origins: Vec<Origin>,
}

/// Resolve a query shape whose tables are already in `cache`
pub fn trace_query(
    shape: &QueryShape,
    cache: &SchemaCache,
    default_schema: Option<&str>,
) -> Result<Vec<MaskingField>, MaskingError> {
    let mut fields = Vec::new();
    let mut index = 0;
    for branch in &shape.branches {
        for column in trace_select(branch, cache, default_schema)? {
            fields.extend(column.origins.into_iter().map(|origin| MaskingField {
                index,
                field: origin.field,
                data_type: origin.data_type,
                table: origin.table,
                schema: origin.schema,
                alias: column.name.clone(),
            }));
            index += 1;
        }
    }
    Ok(fields)
}

fn trace_select(
    select: &SelectShape,
    cache: &SchemaCache,
    default_schema: Option<&str>,
) -> Result<Vec<Traced>, MaskingError> {
    let relations = select
        .relations
        .iter()
        .map(|relation| Ok((relation, relation_columns(relation, cache, default_schema)?)))
        .collect::<Result<Vec<_>, MaskingError>>()?;

    let mut output = Vec::new();
    for item in &select.items {
        match item {
            ProjectionItem::Wildcard => {
                if relations.is_empty() {
                    return Err(MaskingError::NoTablesUsed);
                }
                for (_, columns) in &relations {
                    output.extend(columns.iter().cloned());
                }
            }
            ProjectionItem::QualifiedWildcard(qualifier) => {
                let (_, columns) = relations
                    .iter()
                    .find(|(relation, _)| relation.answers_to(qualifier))
                    .ok_or_else(|| MaskingError::UnknownTable(qualifier.clone()))?;
                output.extend(columns.iter().cloned());
            }
            ProjectionItem::Expr { alias, columns } => {
                let mut origins = Vec::new();
                for column in columns {
                    origins.extend(resolve_column(column, &relations)?.origins.iter().cloned());
                }
                output.push(Traced {
                    name: alias.clone(),
                    origins,
                });
            }
        }
    }
    Ok(output)
}

/// Columns a FROM relation exposes
///
/// A derived table takes the column names of its first UNION branch.
fn relation_columns(
    relation: &Relation,
    cache: &SchemaCache,
    default_schema: Option<&str>,
) -> Result<Vec<Traced>, MaskingError> {
    match &relation.source {
        RelationSource::Table(name) => {
            let key = name
                .resolve(default_schema)
                .ok_or(MaskingError::NoDatabaseSelected)?;
            let table = cache
                .get(&key)
                .ok_or_else(|| MaskingError::UnknownTable(key.fqn()))?;
            Ok(table
                .columns
                .iter()
                .map(|column| Traced {
                    name: column.name.clone(),
                    origins: vec![Origin {
                        field: column.name.clone(),
                        data_type: column.data_type.clone(),
                        table: table.name.clone(),
                        schema: table.schema.clone(),
                    }],
                })
                .collect())
        }
        RelationSource::Derived(query) => match query.branches.first() {
            Some(branch) => trace_select(branch, cache, default_schema),
            None => Ok(Vec::new()),
        },
    }
}

/// First matching column, relations searched in FROM order
fn resolve_column<'r>(
    column: &ColumnRef,
    relations: &'r [(&Relation, Vec<Traced>)],
) -> Result<&'r Traced, MaskingError> {
    relations
        .iter()
        .filter(|(relation, _)| {
            column
                .qualifier
                .as_deref()
                .map_or(true, |qualifier| relation.answers_to(qualifier))
        })
        .flat_map(|(_, columns)| columns)
        .find(|traced| traced.name.eq_ignore_ascii_case(&column.name))
        .ok_or_else(|| {
            MaskingError::UnknownColumn(match &column.qualifier {
                Some(qualifier) => format!("{}.{}", qualifier, column.name),
                None => column.name.clone(),
            })
        })
}
