//! Statement splitting and lowering
//!
//! A batch is tokenized once with sqlparser's MySQL tokenizer and split on
//! top-level `;`. Each piece is lowered into an `AuditStatement` on its own, so
//! one malformed statement never hides the rest of the batch. DML and queries
//! are additionally run through sqlparser's full grammar.

use crate::ast::{
    AlterSpec, AlterTable, AuditStatement, CheckClause, ColumnOption, ColumnPosition, ColumnSpec,
    CreateTable, DmlStatement, DropTable, ObjectName, RenameTable, TableConstraint,
};
use crate::cursor::{is_keyword, token_text, tokens_text, TokenCursor};
use sqlaudit_core::{Diagnostic, DiagnosticCode, TableOption};
use sqlparser::ast::Expr;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer, TokenizerError};

/// Why a statement could not be lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Malformed text
    Syntax,

    /// Well-formed, but not a statement kind the engine audits
    Unsupported,
}

impl ParseErrorKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "SQL parse error",
            Self::Unsupported => "unsupported statement",
        }
    }
}

/// SQL parsing error with diagnostic information
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", .kind.label())]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Unsupported,
            message: message.into(),
        }
    }

    /// Convert to an error-level diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self.kind {
            ParseErrorKind::Syntax => Diagnostic::error(
                DiagnosticCode::SqlParseError,
                format!("Failed to parse SQL: {}", self.message),
            ),
            ParseErrorKind::Unsupported => Diagnostic::error(
                DiagnosticCode::SqlUnsupportedStatement,
                format!("Unsupported statement: {}", self.message),
            ),
        }
    }
}

impl From<TokenizerError> for ParseError {
    fn from(err: TokenizerError) -> Self {
        Self::syntax(err.to_string())
    }
}

impl From<ParserError> for ParseError {
    fn from(err: ParserError) -> Self {
        Self::syntax(err.to_string())
    }
}

/// One statement of a batch: its text and its lowered form
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// Trimmed statement text without the terminating `;`
    pub sql: String,

    /// Lowered statement, or why lowering failed
    pub statement: Result<AuditStatement, ParseError>,
}

/// MySQL statement parser
#[derive(Debug)]
pub struct SqlParser {
    dialect: MySqlDialect,
}

impl SqlParser {
    pub fn new() -> Self {
        Self {
            dialect: MySqlDialect {},
        }
    }

    /// Split a batch into statement texts
    pub fn split(&self, batch: &str) -> Result<Vec<String>, ParseError> {
        Ok(self
            .split_tokens(batch)?
            .into_iter()
            .map(|(sql, _)| sql)
            .collect())
    }

    /// Split a batch and lower every statement
    ///
    /// Fails as a whole only when the batch cannot be tokenized (e.g. an
    /// unterminated string literal); per-statement failures are carried in
    /// `ParsedStatement::statement`.
    pub fn parse_batch(&self, batch: &str) -> Result<Vec<ParsedStatement>, ParseError> {
        Ok(self
            .split_tokens(batch)?
            .into_iter()
            .map(|(sql, tokens)| {
                let statement = self.lower(&sql, &tokens);
                ParsedStatement { sql, statement }
            })
            .collect())
    }

    /// Parse exactly one statement (a trailing `;` is allowed)
    pub fn parse(&self, sql: &str) -> Result<AuditStatement, ParseError> {
        let mut pieces = self.split_tokens(sql)?;
        match pieces.len() {
            0 => Err(ParseError::syntax("empty statement")),
            1 => {
                let (text, tokens) = pieces.remove(0);
                self.lower(&text, &tokens)
            }
            n => Err(ParseError::syntax(format!("expected one statement, found {}", n))),
        }
    }

    fn split_tokens(&self, batch: &str) -> Result<Vec<(String, Vec<Token>)>, ParseError> {
        let tokens = Tokenizer::new(&self.dialect, batch).tokenize_with_location()?;
        let lines = LineIndex::new(batch);

        let mut pieces = Vec::new();
        let mut current: Vec<TokenWithSpan> = Vec::new();
        for token in tokens {
            match token.token {
                Token::SemiColon => flush_piece(&lines, &mut current, &mut pieces),
                Token::EOF => {}
                _ => current.push(token),
            }
        }
        flush_piece(&lines, &mut current, &mut pieces);

        Ok(pieces)
    }

    fn lower(&self, text: &str, tokens: &[Token]) -> Result<AuditStatement, ParseError> {
        let mut cur = TokenCursor::new(tokens);

        let statement = if cur.parse_keyword("USE") {
            AuditStatement::Use {
                database: cur.parse_identifier()?,
            }
        } else if cur.parse_keyword("CREATE") {
            cur.parse_keyword("TEMPORARY");
            if !cur.parse_keyword("TABLE") {
                return Err(unsupported_kind(tokens));
            }
            AuditStatement::CreateTable(parse_create_table(&mut cur)?)
        } else if cur.parse_keyword("DROP") {
            cur.parse_keyword("TEMPORARY");
            if !cur.parse_keyword("TABLE") {
                return Err(unsupported_kind(tokens));
            }
            AuditStatement::DropTable(parse_drop_table(&mut cur)?)
        } else if cur.parse_keyword("ALTER") {
            cur.parse_keyword("IGNORE");
            if !cur.parse_keyword("TABLE") {
                return Err(unsupported_kind(tokens));
            }
            AuditStatement::AlterTable(parse_alter_table(&mut cur)?)
        } else if cur.parse_keyword("RENAME") {
            if !cur.parse_keyword("TABLE") {
                return Err(unsupported_kind(tokens));
            }
            AuditStatement::RenameTable(parse_rename_table(&mut cur)?)
        } else if cur.parse_keyword("TRUNCATE") {
            cur.parse_keyword("TABLE");
            AuditStatement::TruncateTable(parse_object_name(&mut cur)?)
        } else if cur.peek_any_keyword(&["INSERT", "REPLACE"]) {
            self.validate(text)?;
            AuditStatement::Insert(parse_insert(&mut cur)?)
        } else if cur.peek_keyword("UPDATE") {
            self.validate(text)?;
            AuditStatement::Update(parse_update(&mut cur)?)
        } else if cur.peek_keyword("DELETE") {
            self.validate(text)?;
            AuditStatement::Delete(parse_delete(&mut cur)?)
        } else if cur.peek_any_keyword(&["SELECT", "WITH"]) || cur.peek() == Some(&Token::LParen) {
            self.validate(text)?;
            cur.rest();
            AuditStatement::Query
        } else if cur.peek_any_keyword(&["SHOW", "EXPLAIN", "DESC", "DESCRIBE"]) {
            cur.rest();
            AuditStatement::Query
        } else {
            return Err(unsupported_kind(tokens));
        };

        cur.expect_end()?;
        Ok(statement)
    }

    fn validate(&self, text: &str) -> Result<(), ParseError> {
        Parser::parse_sql(&self.dialect, text)?;
        Ok(())
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a standalone expression
pub(crate) fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let tokens = Tokenizer::new(&MySqlDialect {}, text).tokenize()?;
    parse_expr_tokens(tokens)
}

fn parse_expr_tokens(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect).with_tokens(tokens);
    let expr = parser.parse_expr()?;

    let trailing = parser.peek_token().token;
    if trailing != Token::EOF {
        return Err(ParseError::syntax(format!(
            "unexpected {} after expression",
            trailing
        )));
    }
    Ok(expr)
}

fn flush_piece(
    lines: &LineIndex,
    current: &mut Vec<TokenWithSpan>,
    pieces: &mut Vec<(String, Vec<Token>)>,
) {
    let spanned = std::mem::take(current);
    if spanned.iter().all(|t| matches!(t.token, Token::Whitespace(_))) {
        return;
    }
    let (Some(first), Some(last)) = (spanned.first(), spanned.last()) else {
        return;
    };
    let start = lines.offset(first.span.start);
    let end = lines.offset(last.span.end);
    let text = match lines.text.get(start..end) {
        Some(slice) => slice.trim().to_string(),
        None => spanned
            .iter()
            .map(|t| token_text(&t.token))
            .collect::<String>()
            .trim()
            .to_string(),
    };
    pieces.push((text, spanned.into_iter().map(|t| t.token).collect()));
}

/// Maps tokenizer locations (1-based line, 1-based character column) to
/// byte offsets in the batch
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&start) = self.starts.get(line) else {
            return self.text.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.text[start..]
            .char_indices()
            .nth(column)
            .map_or(self.text.len(), |(i, _)| start + i)
    }
}

fn unsupported_kind(tokens: &[Token]) -> ParseError {
    let words: Vec<String> = TokenCursor::new(tokens)
        .rest()
        .iter()
        .take(2)
        .map(|t| token_text(t).to_uppercase())
        .collect();
    ParseError::unsupported(format!("{} is not audited", words.join(" ")))
}

fn parse_object_name(cur: &mut TokenCursor) -> Result<ObjectName, ParseError> {
    let first = cur.parse_identifier()?;
    if cur.consume(&Token::Period) {
        let name = cur.parse_identifier()?;
        Ok(ObjectName {
            schema: Some(first),
            name,
        })
    } else {
        Ok(ObjectName {
            schema: None,
            name: first,
        })
    }
}

fn parse_create_table(cur: &mut TokenCursor) -> Result<CreateTable, ParseError> {
    let if_not_exists = cur.parse_keywords(&["IF", "NOT", "EXISTS"]);
    let name = parse_object_name(cur)?;

    let mut create = CreateTable {
        name,
        if_not_exists,
        columns: Vec::new(),
        constraints: Vec::new(),
        options: Vec::new(),
        like: None,
    };

    if cur.parse_keyword("LIKE") {
        create.like = Some(parse_object_name(cur)?);
        return Ok(create);
    }

    cur.expect(&Token::LParen)?;
    loop {
        if is_constraint_start(cur) {
            create.constraints.push(parse_table_constraint(cur)?);
        } else {
            create.columns.push(parse_column_spec(cur)?);
        }
        if !cur.consume(&Token::Comma) {
            break;
        }
    }
    cur.expect(&Token::RParen)?;

    if cur.peek_any_keyword(&["AS", "SELECT", "IGNORE", "REPLACE"]) {
        return Err(ParseError::unsupported("CREATE TABLE ... SELECT is not audited"));
    }
    create.options = parse_table_options(cur)?;

    Ok(create)
}

fn is_constraint_start(cur: &TokenCursor) -> bool {
    cur.peek_any_keyword(&[
        "CONSTRAINT", "PRIMARY", "UNIQUE", "INDEX", "KEY", "CHECK", "FOREIGN", "FULLTEXT", "SPATIAL",
    ])
}

fn parse_table_constraint(cur: &mut TokenCursor) -> Result<TableConstraint, ParseError> {
    let constraint_name = if cur.parse_keyword("CONSTRAINT") {
        if cur.peek_any_keyword(&["PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]) {
            None
        } else {
            Some(cur.parse_identifier()?)
        }
    } else {
        None
    };

    if cur.parse_keywords(&["PRIMARY", "KEY"]) {
        skip_index_type(cur)?;
        let columns = parse_index_columns(cur)?;
        skip_index_type(cur)?;
        Ok(TableConstraint::PrimaryKey { columns })
    } else if cur.parse_keyword("UNIQUE") {
        let _ = cur.parse_keyword("INDEX") || cur.parse_keyword("KEY");
        let name = parse_index_name(cur)?.or(constraint_name);
        let columns = parse_index_columns(cur)?;
        skip_index_type(cur)?;
        Ok(TableConstraint::Unique { name, columns })
    } else if cur.parse_keyword("INDEX") || cur.parse_keyword("KEY") {
        let name = parse_index_name(cur)?;
        let columns = parse_index_columns(cur)?;
        skip_index_type(cur)?;
        Ok(TableConstraint::Index { name, columns })
    } else if cur.parse_keyword("FULLTEXT") || cur.parse_keyword("SPATIAL") {
        let _ = cur.parse_keyword("INDEX") || cur.parse_keyword("KEY");
        let name = parse_index_name(cur)?;
        let columns = parse_index_columns(cur)?;
        Ok(TableConstraint::Index { name, columns })
    } else if cur.parse_keyword("CHECK") {
        Ok(TableConstraint::Check(parse_check_body(cur, constraint_name)?))
    } else if cur.peek_keyword("FOREIGN") {
        Err(ParseError::unsupported("FOREIGN KEY constraints are not audited"))
    } else {
        Err(cur.unexpected("constraint"))
    }
}

fn parse_index_name(cur: &mut TokenCursor) -> Result<Option<String>, ParseError> {
    match cur.peek() {
        Some(Token::Word(_)) if !cur.peek_keyword("USING") => Ok(Some(cur.parse_identifier()?)),
        _ => {
            skip_index_type(cur)?;
            Ok(None)
        }
    }
}

fn skip_index_type(cur: &mut TokenCursor) -> Result<(), ParseError> {
    if cur.parse_keyword("USING") {
        cur.parse_identifier()?;
    }
    Ok(())
}

/// `(a, b(10), c DESC)` → `[a, b, c]`
fn parse_index_columns(cur: &mut TokenCursor) -> Result<Vec<String>, ParseError> {
    let inner = cur.parse_parenthesized()?;
    let mut sub = TokenCursor::new(&inner);
    let mut columns = Vec::new();
    loop {
        columns.push(sub.parse_identifier()?);
        if sub.peek() == Some(&Token::LParen) {
            sub.parse_parenthesized()?;
        }
        let _ = sub.parse_keyword("ASC") || sub.parse_keyword("DESC");
        if !sub.consume(&Token::Comma) {
            break;
        }
    }
    sub.expect_end()?;
    Ok(columns)
}

fn parse_check_body(cur: &mut TokenCursor, name: Option<String>) -> Result<CheckClause, ParseError> {
    let expr = parse_expr_tokens(cur.parse_parenthesized()?)?;

    // `NOT` may also open a following `NOT NULL` column option
    let enforced = if cur.peek_keyword("NOT") && cur.peek_nth_keyword(1, "ENFORCED") {
        cur.parse_keywords(&["NOT", "ENFORCED"]);
        false
    } else {
        cur.parse_keyword("ENFORCED");
        true
    };

    Ok(CheckClause { name, expr, enforced })
}

fn parse_column_spec(cur: &mut TokenCursor) -> Result<ColumnSpec, ParseError> {
    let name = cur.parse_identifier()?;
    let data_type = parse_data_type(cur)?;
    let options = parse_column_options(cur)?;
    Ok(ColumnSpec {
        name,
        data_type,
        options,
    })
}

fn parse_data_type(cur: &mut TokenCursor) -> Result<String, ParseError> {
    let mut data_type = match cur.peek() {
        Some(Token::Word(word)) if word.quote_style.is_none() => word.value.to_uppercase(),
        _ => return Err(cur.unexpected("data type")),
    };
    cur.next_token();

    if data_type == "DOUBLE" && cur.parse_keyword("PRECISION") {
        data_type.push_str(" PRECISION");
    }
    if cur.peek() == Some(&Token::LParen) {
        let args = cur.parse_parenthesized()?;
        data_type = format!("{}({})", data_type, tokens_text(&args));
    }

    loop {
        if let Some(flag) = ["UNSIGNED", "SIGNED", "ZEROFILL", "BINARY"]
            .into_iter()
            .find(|k| cur.peek_keyword(k))
        {
            cur.next_token();
            data_type.push(' ');
            data_type.push_str(flag);
        } else if cur.parse_keywords(&["CHARACTER", "SET"]) || cur.parse_keyword("CHARSET") {
            let charset = cur.parse_identifier()?;
            data_type.push_str(&format!(" CHARACTER SET {}", charset));
        } else {
            break;
        }
    }

    Ok(data_type)
}

fn parse_column_options(cur: &mut TokenCursor) -> Result<Vec<ColumnOption>, ParseError> {
    let mut options = Vec::new();

    loop {
        if cur.is_done()
            || matches!(cur.peek(), Some(Token::Comma) | Some(Token::RParen))
            || cur.peek_any_keyword(&["FIRST", "AFTER"])
        {
            break;
        }

        let option = if cur.parse_keywords(&["NOT", "NULL"]) {
            ColumnOption::NotNull
        } else if cur.parse_keyword("NULL") {
            ColumnOption::Null
        } else if cur.parse_keyword("DEFAULT") {
            ColumnOption::Default(parse_value_text(cur)?)
        } else if cur.parse_keyword("AUTO_INCREMENT") {
            ColumnOption::AutoIncrement
        } else if cur.parse_keywords(&["PRIMARY", "KEY"]) || cur.parse_keyword("KEY") {
            ColumnOption::PrimaryKey
        } else if cur.parse_keyword("UNIQUE") {
            cur.parse_keyword("KEY");
            ColumnOption::Unique
        } else if cur.parse_keyword("COMMENT") {
            match cur.next_token() {
                Some(Token::SingleQuotedString(text)) | Some(Token::DoubleQuotedString(text)) => {
                    ColumnOption::Comment(text)
                }
                _ => return Err(ParseError::syntax("expected string literal after COMMENT")),
            }
        } else if cur.parse_keyword("COLLATE") {
            ColumnOption::Collate(cur.parse_identifier()?)
        } else if cur.parse_keywords(&["ON", "UPDATE"]) {
            ColumnOption::OnUpdate(parse_value_text(cur)?)
        } else if cur.parse_keyword("CONSTRAINT") {
            let name = if cur.peek_keyword("CHECK") {
                None
            } else {
                Some(cur.parse_identifier()?)
            };
            cur.expect_keyword("CHECK")?;
            ColumnOption::Check(parse_check_body(cur, name)?)
        } else if cur.parse_keyword("CHECK") {
            ColumnOption::Check(parse_check_body(cur, None)?)
        } else if cur.parse_keywords(&["CHARACTER", "SET"]) || cur.parse_keyword("CHARSET") {
            cur.parse_identifier()?;
            continue;
        } else if cur.peek_any_keyword(&["GENERATED", "AS", "STORED", "VIRTUAL", "REFERENCES"]) {
            return Err(ParseError::unsupported(format!(
                "column option {} is not audited",
                cur.remaining().first().map(token_text).unwrap_or_default()
            )));
        } else {
            return Err(cur.unexpected("column option"));
        };

        options.push(option);
    }

    Ok(options)
}

/// Literal or call after DEFAULT / ON UPDATE, e.g. `-1`, `'x'`, `CURRENT_TIMESTAMP(3)`
fn parse_value_text(cur: &mut TokenCursor) -> Result<String, ParseError> {
    let mut text = String::new();
    if cur.consume(&Token::Minus) {
        text.push('-');
    } else {
        cur.consume(&Token::Plus);
    }

    match cur.peek() {
        Some(Token::LParen) => {
            let inner = cur.parse_parenthesized()?;
            text.push_str(&format!("({})", tokens_text(&inner)));
        }
        Some(Token::Comma) | Some(Token::RParen) | None => return Err(cur.unexpected("value")),
        Some(_) => {
            if let Some(token) = cur.next_token() {
                text.push_str(&token_text(&token));
            }
            if cur.peek() == Some(&Token::LParen) {
                let args = cur.parse_parenthesized()?;
                text.push_str(&format!("({})", tokens_text(&args)));
            }
        }
    }

    Ok(text)
}

fn parse_position(cur: &mut TokenCursor) -> Result<Option<ColumnPosition>, ParseError> {
    if cur.parse_keyword("FIRST") {
        Ok(Some(ColumnPosition::First))
    } else if cur.parse_keyword("AFTER") {
        Ok(Some(ColumnPosition::After(cur.parse_identifier()?)))
    } else {
        Ok(None)
    }
}

/// `ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='x'`
fn parse_table_options(cur: &mut TokenCursor) -> Result<Vec<TableOption>, ParseError> {
    let mut options = Vec::new();

    while !cur.is_done() {
        cur.consume(&Token::Comma);

        let mut name: Vec<String> = Vec::new();
        while let Some(Token::Word(word)) = cur.peek() {
            if word.quote_style.is_some() {
                break;
            }
            name.push(word.value.to_uppercase());
            cur.next_token();
            if cur.consume(&Token::Eq) {
                break;
            }
            // only DEFAULT and CHARACTER continue a multi-word option name
            if !matches!(name.last().map(String::as_str), Some("DEFAULT" | "CHARACTER")) {
                break;
            }
        }

        if name.is_empty() {
            return Err(cur.unexpected("table option"));
        }
        let value = match cur.next_token() {
            Some(token) => token_text(&token),
            None => return Err(cur.unexpected("table option value")),
        };
        options.push(TableOption {
            name: name.join(" "),
            value,
        });
    }

    Ok(options)
}

fn parse_drop_table(cur: &mut TokenCursor) -> Result<DropTable, ParseError> {
    let if_exists = cur.parse_keywords(&["IF", "EXISTS"]);
    let mut names = vec![parse_object_name(cur)?];
    while cur.consume(&Token::Comma) {
        names.push(parse_object_name(cur)?);
    }
    let _ = cur.parse_keyword("RESTRICT") || cur.parse_keyword("CASCADE");
    Ok(DropTable { names, if_exists })
}

fn parse_rename_table(cur: &mut TokenCursor) -> Result<RenameTable, ParseError> {
    let mut pairs = Vec::new();
    loop {
        let from = parse_object_name(cur)?;
        cur.expect_keyword("TO")?;
        let to = parse_object_name(cur)?;
        pairs.push((from, to));
        if !cur.consume(&Token::Comma) {
            break;
        }
    }
    Ok(RenameTable { pairs })
}

fn parse_alter_table(cur: &mut TokenCursor) -> Result<AlterTable, ParseError> {
    let name = parse_object_name(cur)?;
    let mut specs = vec![parse_alter_spec(cur)?];
    while cur.consume(&Token::Comma) {
        specs.push(parse_alter_spec(cur)?);
    }
    Ok(AlterTable { name, specs })
}

fn parse_alter_spec(cur: &mut TokenCursor) -> Result<AlterSpec, ParseError> {
    if cur.parse_keyword("ADD") {
        if cur.parse_keyword("COLUMN") || !is_constraint_start(cur) {
            if cur.peek() == Some(&Token::LParen) {
                return Err(ParseError::unsupported("ADD COLUMN with a column list is not audited"));
            }
            let column = parse_column_spec(cur)?;
            let position = parse_position(cur)?;
            return Ok(AlterSpec::AddColumn { column, position });
        }
        return Ok(AlterSpec::AddConstraint(parse_table_constraint(cur)?));
    }

    if cur.parse_keyword("DROP") {
        return if cur.parse_keyword("COLUMN") {
            Ok(AlterSpec::DropColumn { name: cur.parse_identifier()? })
        } else if cur.parse_keywords(&["PRIMARY", "KEY"]) {
            Ok(AlterSpec::DropPrimaryKey)
        } else if cur.parse_keyword("INDEX") || cur.parse_keyword("KEY") {
            Ok(AlterSpec::DropIndex { name: cur.parse_identifier()? })
        } else if cur.parse_keyword("CHECK") {
            Ok(AlterSpec::DropCheck { name: cur.parse_identifier()? })
        } else if cur.parse_keyword("CONSTRAINT") {
            Ok(AlterSpec::DropConstraint { name: cur.parse_identifier()? })
        } else if cur.peek_keyword("FOREIGN") {
            Err(ParseError::unsupported("DROP FOREIGN KEY is not audited"))
        } else {
            Ok(AlterSpec::DropColumn { name: cur.parse_identifier()? })
        };
    }

    if cur.parse_keyword("ALTER") {
        if cur.parse_keyword("CHECK") || cur.parse_keyword("CONSTRAINT") {
            let name = cur.parse_identifier()?;
            let enforced = if cur.parse_keywords(&["NOT", "ENFORCED"]) {
                false
            } else {
                cur.expect_keyword("ENFORCED")?;
                true
            };
            return Ok(AlterSpec::AlterCheck { name, enforced });
        }
        return Err(ParseError::unsupported("ALTER COLUMN is not audited"));
    }

    if cur.parse_keyword("MODIFY") {
        cur.parse_keyword("COLUMN");
        let column = parse_column_spec(cur)?;
        let position = parse_position(cur)?;
        return Ok(AlterSpec::ModifyColumn { column, position });
    }

    if cur.parse_keyword("CHANGE") {
        cur.parse_keyword("COLUMN");
        let old_name = cur.parse_identifier()?;
        let column = parse_column_spec(cur)?;
        let position = parse_position(cur)?;
        return Ok(AlterSpec::ChangeColumn {
            old_name,
            column,
            position,
        });
    }

    if cur.parse_keyword("RENAME") {
        if cur.parse_keyword("COLUMN") {
            let old_name = cur.parse_identifier()?;
            cur.expect_keyword("TO")?;
            let new_name = cur.parse_identifier()?;
            return Ok(AlterSpec::RenameColumn { old_name, new_name });
        }
        if cur.parse_keyword("INDEX") || cur.parse_keyword("KEY") {
            let old_name = cur.parse_identifier()?;
            cur.expect_keyword("TO")?;
            let new_name = cur.parse_identifier()?;
            return Ok(AlterSpec::RenameIndex { old_name, new_name });
        }
        let _ = cur.parse_keyword("TO") || cur.parse_keyword("AS");
        return Ok(AlterSpec::RenameTable {
            new_name: parse_object_name(cur)?,
        });
    }

    match cur.peek() {
        Some(token) => Err(ParseError::unsupported(format!(
            "ALTER TABLE clause {} is not audited",
            token_text(token).to_uppercase()
        ))),
        None => Err(cur.unexpected("ALTER TABLE clause")),
    }
}

fn parse_insert(cur: &mut TokenCursor) -> Result<DmlStatement, ParseError> {
    cur.next_token();
    while cur.peek_any_keyword(&["LOW_PRIORITY", "DELAYED", "HIGH_PRIORITY", "IGNORE"]) {
        cur.next_token();
    }
    cur.parse_keyword("INTO");
    let table = parse_object_name(cur)?;

    let mut columns = Vec::new();
    if cur.peek() == Some(&Token::LParen) && !cur.peek_nth_keyword(1, "SELECT") {
        let inner = cur.parse_parenthesized()?;
        let mut sub = TokenCursor::new(&inner);
        while !sub.is_done() {
            columns.push(sub.parse_identifier()?);
            if !sub.consume(&Token::Comma) {
                break;
            }
        }
        sub.expect_end()?;
    }

    cur.rest();
    Ok(DmlStatement {
        table,
        columns,
        has_where: false,
    })
}

fn parse_update(cur: &mut TokenCursor) -> Result<DmlStatement, ParseError> {
    cur.next_token();
    while cur.peek_any_keyword(&["LOW_PRIORITY", "IGNORE"]) {
        cur.next_token();
    }
    let table = parse_object_name(cur)?;
    let has_where = has_top_level_where(&cur.rest());
    Ok(DmlStatement {
        table,
        columns: Vec::new(),
        has_where,
    })
}

fn parse_delete(cur: &mut TokenCursor) -> Result<DmlStatement, ParseError> {
    cur.next_token();
    while cur.peek_any_keyword(&["LOW_PRIORITY", "QUICK", "IGNORE"]) {
        cur.next_token();
    }
    cur.parse_keyword("FROM");
    let table = parse_object_name(cur)?;
    let has_where = has_top_level_where(&cur.rest());
    Ok(DmlStatement {
        table,
        columns: Vec::new(),
        has_where,
    })
}

fn has_top_level_where(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            t if depth == 0 && is_keyword(t, "WHERE") => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(sql: &str) -> AuditStatement {
        SqlParser::new().parse(sql).unwrap()
    }

    #[test]
    fn split_respects_quotes_and_comments() {
        let parser = SqlParser::new();
        let pieces = parser
            .split("INSERT INTO t VALUES('a;b'); -- trailing; comment\n; SELECT 1;")
            .unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], "INSERT INTO t VALUES('a;b')");
        assert!(pieces[1].ends_with("SELECT 1"));
    }

    #[test]
    fn statement_text_is_sliced_from_the_batch() {
        let parser = SqlParser::new();
        let batch = "select  *\n  FROM `My Table`  where name = 'a''b' ;\r\nINSERT INTO t VALUES (\"x\", 'é');";
        let pieces = parser.split(batch).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], "select  *\n  FROM `My Table`  where name = 'a''b'");
        assert_eq!(pieces[1], "INSERT INTO t VALUES (\"x\", 'é')");

        let parsed = parser.parse_batch("SELECT 'ü';   UPDATE t SET a=1   WHERE id=2").unwrap();
        assert_eq!(parsed[0].sql, "SELECT 'ü'");
        assert_eq!(parsed[1].sql, "UPDATE t SET a=1   WHERE id=2");
    }

    #[test]
    fn column_check_is_lowered() {
        let AuditStatement::CreateTable(create) = parse("CREATE TABLE t (age INT CHECK (age >= 18))") else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.columns.len(), 1);
        let checks: Vec<_> = create.columns[0].checks().collect();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].expression(), "`age`>=18");
        assert_eq!(checks[0].name, None);
    }

    #[test]
    fn table_check_not_enforced() {
        let AuditStatement::CreateTable(create) = parse(
            "CREATE TABLE t (id INT, CONSTRAINT chk_positive CHECK (id > 0) NOT ENFORCED)",
        ) else {
            panic!("expected CREATE TABLE");
        };
        match &create.constraints[0] {
            TableConstraint::Check(check) => {
                assert_eq!(check.name.as_deref(), Some("chk_positive"));
                assert!(!check.enforced);
            }
            other => panic!("unexpected constraint {:?}", other),
        }
    }

    #[test]
    fn check_followed_by_not_null() {
        let AuditStatement::CreateTable(create) =
            parse("CREATE TABLE t (age INT CHECK (age > 0) NOT NULL)")
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(create.columns[0].options.len(), 2);
        assert_eq!(create.columns[0].options[1], ColumnOption::NotNull);
    }

    #[test]
    fn alter_check_clauses() {
        let AuditStatement::AlterTable(alter) =
            parse("ALTER TABLE test.t ALTER CHECK chk_age NOT ENFORCED, DROP CHECK chk_x")
        else {
            panic!("expected ALTER TABLE");
        };
        assert_eq!(alter.name, ObjectName::new(Some("test"), "t"));
        assert_eq!(
            alter.specs,
            vec![
                AlterSpec::AlterCheck { name: "chk_age".to_string(), enforced: false },
                AlterSpec::DropCheck { name: "chk_x".to_string() },
            ]
        );
    }

    #[test]
    fn table_options() {
        let AuditStatement::CreateTable(create) =
            parse("CREATE TABLE t (id INT) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='users'")
        else {
            panic!("expected CREATE TABLE");
        };
        let names: Vec<_> = create.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["ENGINE", "DEFAULT CHARSET", "COMMENT"]);
        assert_eq!(create.options[2].value, "'users'");
    }

    #[test]
    fn dml_where_detection() {
        let AuditStatement::Update(update) = parse("UPDATE t SET a = (SELECT 1 FROM u WHERE x = 1)")
        else {
            panic!("expected UPDATE");
        };
        assert!(!update.has_where);

        let AuditStatement::Delete(delete) = parse("DELETE FROM db.t WHERE id = 1") else {
            panic!("expected DELETE");
        };
        assert!(delete.has_where);
        assert_eq!(delete.table.schema.as_deref(), Some("db"));
    }

    #[test]
    fn unsupported_and_broken_statements() {
        let parser = SqlParser::new();

        let err = parser.parse("GRANT ALL ON *.* TO bob").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unsupported);
        assert_eq!(err.to_diagnostic().code, DiagnosticCode::SqlUnsupportedStatement);

        let err = parser.parse("CREATE TABLE t (id INT").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);

        let err = parser.parse("INSERT INTO t VALUES (").unwrap_err();
        assert_eq!(err.to_diagnostic().code, DiagnosticCode::SqlParseError);
    }
}
