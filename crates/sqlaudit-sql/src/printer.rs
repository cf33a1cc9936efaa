//! Canonical printer for CHECK predicates
//!
//! Output is a pure function of the expression tree: identifiers are
//! backtick-quoted, symbolic operators carry no surrounding whitespace, word
//! operators get single spaces, and parentheses appear only where the source
//! had them. Printing the re-parsed output yields the same text.

use crate::parser::{parse_expression, ParseError};
use sqlaudit_core::quote_ident;
use sqlparser::ast::{
    CastKind, Expr, ExtractSyntax, Function, FunctionArg, FunctionArgExpr, FunctionArguments,
    Interval,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Render an expression in canonical form
pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

/// Normalize predicate text coming from live metadata
///
/// `information_schema` wraps check clauses in parentheses; the outermost
/// layers are dropped so the text compares equal to one parsed from DDL.
pub fn normalize_check_expression(text: &str) -> Result<String, ParseError> {
    let mut expr = parse_expression(text)?;
    while let Expr::Nested(inner) = expr {
        expr = *inner;
    }
    Ok(render_expr(&expr))
}

/// Columns a canonical predicate refers to, in first-use order
///
/// Relies on the printer quoting every column reference; for `t`.`c` only
/// the column part is reported.
pub fn check_expression_columns(text: &str) -> Result<Vec<String>, ParseError> {
    let tokens = Tokenizer::new(&MySqlDialect {}, text).tokenize()?;
    let mut columns: Vec<String> = Vec::new();
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        let Token::Word(word) = token else { continue };
        if word.quote_style != Some('`') || iter.peek() == Some(&&Token::Period) {
            continue;
        }
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(&word.value)) {
            columns.push(word.value.clone());
        }
    }
    Ok(columns)
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Identifier(ident) => out.push_str(&quote_ident(&ident.value)),
        Expr::CompoundIdentifier(idents) => {
            let parts: Vec<String> = idents.iter().map(|i| quote_ident(&i.value)).collect();
            out.push_str(&parts.join("."));
        }
        Expr::Value(value) => out.push_str(&value.to_string()),
        Expr::Nested(inner) => {
            out.push('(');
            write_expr(inner, out);
            out.push(')');
        }
        Expr::Tuple(items) => {
            out.push('(');
            write_list(items, out);
            out.push(')');
        }
        Expr::BinaryOp { left, op, right } => {
            write_expr(left, out);
            write_operator(&op.to_string(), &render_expr(right), out);
        }
        Expr::UnaryOp { op, expr } => {
            let op = op.to_string();
            let operand = render_expr(expr);
            out.push_str(&op);
            if is_word(&op) || (op.ends_with('-') && operand.starts_with('-')) {
                out.push(' ');
            }
            out.push_str(&operand);
        }
        Expr::IsNull(inner) => write_suffixed(inner, " IS NULL", out),
        Expr::IsNotNull(inner) => write_suffixed(inner, " IS NOT NULL", out),
        Expr::IsTrue(inner) => write_suffixed(inner, " IS TRUE", out),
        Expr::IsNotTrue(inner) => write_suffixed(inner, " IS NOT TRUE", out),
        Expr::IsFalse(inner) => write_suffixed(inner, " IS FALSE", out),
        Expr::IsNotFalse(inner) => write_suffixed(inner, " IS NOT FALSE", out),
        Expr::IsUnknown(inner) => write_suffixed(inner, " IS UNKNOWN", out),
        Expr::IsNotUnknown(inner) => write_suffixed(inner, " IS NOT UNKNOWN", out),
        Expr::Between { expr, negated, low, high } => {
            write_expr(expr, out);
            out.push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
            write_expr(low, out);
            out.push_str(" AND ");
            write_expr(high, out);
        }
        Expr::InList { expr, list, negated } => {
            write_expr(expr, out);
            out.push_str(if *negated { " NOT IN (" } else { " IN (" });
            write_list(list, out);
            out.push(')');
        }
        Expr::Like { negated, any: false, expr, pattern, escape_char } => {
            write_match(expr, "LIKE", *negated, pattern, escape_char.as_deref(), out)
        }
        Expr::ILike { negated, any: false, expr, pattern, escape_char } => {
            write_match(expr, "ILIKE", *negated, pattern, escape_char.as_deref(), out)
        }
        Expr::SimilarTo { negated, expr, pattern, escape_char } => {
            write_match(expr, "SIMILAR TO", *negated, pattern, escape_char.as_deref(), out)
        }
        Expr::RLike { negated, expr, pattern, regexp } => {
            let keyword = if *regexp { "REGEXP" } else { "RLIKE" };
            write_match(expr, keyword, *negated, pattern, None, out)
        }
        Expr::Case { operand, conditions, results, else_result } => {
            out.push_str("CASE");
            if let Some(operand) = operand {
                out.push(' ');
                write_expr(operand, out);
            }
            for (condition, result) in conditions.iter().zip(results) {
                out.push_str(" WHEN ");
                write_expr(condition, out);
                out.push_str(" THEN ");
                write_expr(result, out);
            }
            if let Some(else_result) = else_result {
                out.push_str(" ELSE ");
                write_expr(else_result, out);
            }
            out.push_str(" END");
        }
        Expr::Cast { kind: CastKind::Cast, expr, data_type, format: None } => {
            out.push_str("CAST(");
            write_expr(expr, out);
            out.push_str(" AS ");
            out.push_str(&data_type.to_string());
            out.push(')');
        }
        Expr::Extract { field, syntax, expr } => {
            out.push_str("EXTRACT(");
            out.push_str(&field.to_string());
            out.push_str(match syntax {
                ExtractSyntax::From => " FROM ",
                ExtractSyntax::Comma => ",",
            });
            write_expr(expr, out);
            out.push(')');
        }
        Expr::Substring { expr, substring_from, substring_for, special } => {
            out.push_str("SUBSTRING(");
            write_expr(expr, out);
            let (from_sep, for_sep) = if *special { (",", ",") } else { (" FROM ", " FOR ") };
            if let Some(from) = substring_from {
                out.push_str(from_sep);
                write_expr(from, out);
            }
            if let Some(length) = substring_for {
                out.push_str(for_sep);
                write_expr(length, out);
            }
            out.push(')');
        }
        Expr::Collate { expr, collation } => {
            write_expr(expr, out);
            out.push_str(" COLLATE ");
            out.push_str(&collation.to_string());
        }
        Expr::Interval(interval) => write_interval(interval, out),
        Expr::Function(func) => write_function(func, out),
        other => out.push_str(&other.to_string()),
    }
}

fn write_list(items: &[Expr], out: &mut String) {
    let items: Vec<String> = items.iter().map(render_expr).collect();
    out.push_str(&items.join(","));
}

fn write_suffixed(expr: &Expr, suffix: &str, out: &mut String) {
    write_expr(expr, out);
    out.push_str(suffix);
}

fn write_match(
    expr: &Expr,
    keyword: &str,
    negated: bool,
    pattern: &Expr,
    escape: Option<&str>,
    out: &mut String,
) {
    write_expr(expr, out);
    out.push(' ');
    if negated {
        out.push_str("NOT ");
    }
    out.push_str(keyword);
    out.push(' ');
    write_expr(pattern, out);
    if let Some(escape) = escape {
        out.push_str(" ESCAPE '");
        out.push_str(&escape.replace('\'', "''"));
        out.push('\'');
    }
}

fn write_interval(interval: &Interval, out: &mut String) {
    let plain = interval.leading_precision.is_none()
        && interval.last_field.is_none()
        && interval.fractional_seconds_precision.is_none();
    if !plain {
        out.push_str(&interval.to_string());
        return;
    }
    out.push_str("INTERVAL ");
    write_expr(&interval.value, out);
    if let Some(field) = &interval.leading_field {
        out.push(' ');
        out.push_str(&field.to_string());
    }
}

/// Plain calls are printed argument by argument; window and aggregate
/// decorations keep sqlparser's rendering
fn write_function(func: &Function, out: &mut String) {
    let list = match &func.args {
        FunctionArguments::List(list)
            if list.clauses.is_empty()
                && matches!(func.parameters, FunctionArguments::None)
                && func.filter.is_none()
                && func.null_treatment.is_none()
                && func.over.is_none()
                && func.within_group.is_empty()
                && !func.uses_odbc_syntax =>
        {
            list
        }
        _ => {
            out.push_str(&func.to_string());
            return;
        }
    };

    out.push_str(&func.name.to_string());
    out.push('(');
    if let Some(treatment) = &list.duplicate_treatment {
        out.push_str(&treatment.to_string());
        out.push(' ');
    }
    let args: Vec<String> = list
        .args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => render_expr(expr),
            other => other.to_string(),
        })
        .collect();
    out.push_str(&args.join(","));
    out.push(')');
}

fn write_operator(op: &str, rhs: &str, out: &mut String) {
    if is_word(op) {
        out.push(' ');
        out.push_str(op);
        out.push(' ');
    } else {
        out.push_str(op);
        // `a- -1` must not collapse into a `--` comment
        if op.ends_with('-') && rhs.starts_with('-') {
            out.push(' ');
        }
    }
    out.push_str(rhs);
}

fn is_word(op: &str) -> bool {
    op.chars().any(|c| c.is_ascii_alphabetic())
}
