//! Token cursor used to lower statement text
//!
//! Keywords are matched on unquoted words, case-insensitively, so backticked
//! identifiers that happen to spell a keyword are never mistaken for one.

use crate::parser::ParseError;
use sqlparser::tokenizer::Token;

pub(crate) struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    /// Build a cursor over significant tokens (whitespace and comments dropped)
    pub(crate) fn new(tokens: &[Token]) -> Self {
        let tokens = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .cloned()
            .collect();
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    pub(crate) fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume everything that is left
    pub(crate) fn rest(&mut self) -> Vec<Token> {
        let rest = self.tokens[self.pos..].to_vec();
        self.pos = self.tokens.len();
        rest
    }

    /// Remaining tokens, not consumed
    pub(crate) fn remaining(&self) -> &[Token] {
        &self.tokens[self.pos..]
    }

    pub(crate) fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_nth_keyword(0, keyword)
    }

    pub(crate) fn peek_nth_keyword(&self, n: usize, keyword: &str) -> bool {
        self.peek_nth(n).is_some_and(|t| is_keyword(t, keyword))
    }

    pub(crate) fn peek_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.peek_keyword(k))
    }

    pub(crate) fn parse_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence, all or nothing
    pub(crate) fn parse_keywords(&mut self, keywords: &[&str]) -> bool {
        let matched = keywords
            .iter()
            .enumerate()
            .all(|(n, k)| self.peek_nth_keyword(n, k));
        if matched {
            self.pos += keywords.len();
        }
        matched
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.parse_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    pub(crate) fn consume(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.consume(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    pub(crate) fn expect_end(&self) -> Result<(), ParseError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    /// Identifier, quoted or bare
    pub(crate) fn parse_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let value = word.value.clone();
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `( ... )` with balanced nesting; returns the inner tokens
    pub(crate) fn parse_parenthesized(&mut self) -> Result<Vec<Token>, ParseError> {
        self.expect(&Token::LParen)?;
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(token) = self.next_token() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.tokens[start..self.pos - 1].to_vec());
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::syntax("unbalanced parentheses"))
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::syntax(format!("expected {}, found {}", expected, found)),
            None => ParseError::syntax(format!("expected {}, found end of statement", expected)),
        }
    }
}

/// Whether `token` is the unquoted keyword `keyword`
pub(crate) fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
}

/// SQL text of a single token
///
/// String literals and quoted identifiers are re-escaped so the text parses
/// back to the same token.
pub(crate) fn token_text(token: &Token) -> String {
    match token {
        Token::SingleQuotedString(s) => format!("'{}'", escape_literal(s).replace('\'', "''")),
        Token::DoubleQuotedString(s) => format!("\"{}\"", escape_literal(s).replace('"', "\"\"")),
        Token::Word(word) => match word.quote_style {
            Some('`') => format!("`{}`", word.value.replace('`', "``")),
            _ => word.to_string(),
        },
        other => other.to_string(),
    }
}

// MySQL treats backslash as an escape inside string literals
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\")
}

/// Concatenated text of a token run, spaced where words would fuse
pub(crate) fn tokens_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev_word = false;
    for token in tokens {
        let is_word = matches!(token, Token::Word(_) | Token::Number(..));
        if prev_word && is_word {
            out.push(' ');
        }
        out.push_str(&token_text(token));
        prev_word = is_word;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::tokenizer::Tokenizer;

    fn cursor(sql: &str) -> TokenCursor {
        let tokens = Tokenizer::new(&MySqlDialect {}, sql).tokenize().unwrap();
        TokenCursor::new(&tokens)
    }

    #[test]
    fn keywords_ignore_case_and_quoted_words() {
        let mut cur = cursor("alter `table` TABLE");
        assert!(cur.parse_keyword("ALTER"));
        assert!(!cur.parse_keyword("TABLE"));
        assert_eq!(cur.parse_identifier().unwrap(), "table");
        assert!(cur.parse_keywords(&["TABLE"]));
        assert!(cur.expect_end().is_ok());
    }

    #[test]
    fn parenthesized_group_is_balanced() {
        let mut cur = cursor("(a > (1 + 2)) NOT ENFORCED");
        let inner = cur.parse_parenthesized().unwrap();
        assert_eq!(tokens_text(&inner), "a>(1+2)");
        assert!(cur.parse_keywords(&["NOT", "ENFORCED"]));
    }

    #[test]
    fn quotes_survive_token_text() {
        let mut cur = cursor("'it''s' `a``b`");
        assert_eq!(token_text(&cur.next_token().unwrap()), "'it''s'");
        assert_eq!(token_text(&cur.next_token().unwrap()), "`a``b`");
    }
}
