//! Recursive-descent parser for the supported subset.
//!
//! ```text
//! INSERT INTO t (a, b) VALUES (1, 'x'), (2, NULL)
//! SELECT * | a, b FROM t [WHERE cond {AND cond}] [LIMIT n]
//! cond := col op literal | col IS [NOT] NULL
//! ```
//!
//! Keywords are case-insensitive; one trailing `;` is allowed.

use std::collections::BTreeSet;

use serde_json::{Number, Value};

use crate::ast::{Condition, Insert, Projection, Select, Statement, Test};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Token, TokenKind};

/// Parse one statement.
pub fn parse(sql: &str) -> ParseResult<Statement> {
    Parser::new(tokenize(sql)?).statement()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // The lexer always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            token.offset,
            format!("expected {expected}, found {}", token.kind.describe()),
        )
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(keyword))
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error_here(&kind.describe()))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn identifier(&mut self, what: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Word(w) if !is_reserved(w) => {
                let w = w.clone();
                self.advance();
                Ok(w)
            }
            TokenKind::QuotedIdent(w) => {
                let w = w.clone();
                self.advance();
                Ok(w)
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let statement = if self.at_keyword("INSERT") {
            Statement::Insert(self.insert()?)
        } else if self.at_keyword("SELECT") {
            Statement::Select(self.select()?)
        } else {
            return Err(self.error_here("INSERT or SELECT"));
        };
        self.eat(TokenKind::Semicolon);
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error_here("end of statement"));
        }
        Ok(statement)
    }

    fn insert(&mut self) -> ParseResult<Insert> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.identifier("table name")?;

        self.expect(TokenKind::LParen)?;
        let mut columns = Vec::new();
        let mut seen = BTreeSet::new();
        loop {
            let offset = self.peek().offset;
            let column = self.identifier("column name")?;
            if !seen.insert(column.clone()) {
                return Err(ParseError::new(offset, format!("duplicate column {column}")));
            }
            columns.push(column);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        self.expect_keyword("VALUES")?;
        let mut rows = Vec::new();
        loop {
            let open = self.expect(TokenKind::LParen)?;
            let mut row = Vec::with_capacity(columns.len());
            loop {
                row.push(self.literal()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            if row.len() != columns.len() {
                return Err(ParseError::new(
                    open.offset,
                    format!(
                        "row has {} value(s) but {} column(s) were named",
                        row.len(),
                        columns.len()
                    ),
                ));
            }
            rows.push(row);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(Insert {
            table,
            columns,
            rows,
        })
    }

    fn select(&mut self) -> ParseResult<Select> {
        self.expect_keyword("SELECT")?;
        let projection = if self.eat(TokenKind::Star) {
            Projection::All
        } else {
            let mut columns = vec![self.identifier("column name or '*'")?];
            while self.eat(TokenKind::Comma) {
                columns.push(self.identifier("column name")?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.identifier("table name")?;

        let mut conditions = Vec::new();
        if self.eat_keyword("WHERE") {
            conditions.push(self.condition()?);
            while self.eat_keyword("AND") {
                conditions.push(self.condition()?);
            }
        }

        let mut limit = None;
        if self.eat_keyword("LIMIT") {
            let token = self.advance();
            match token.kind {
                TokenKind::Int(n) if n >= 0 => {
                    limit = Some(usize::try_from(n).map_err(|_| {
                        ParseError::new(token.offset, "LIMIT out of range")
                    })?);
                }
                other => {
                    return Err(ParseError::new(
                        token.offset,
                        format!("expected non-negative integer, found {}", other.describe()),
                    ))
                }
            }
        }

        Ok(Select {
            table,
            projection,
            conditions,
            limit,
        })
    }

    fn condition(&mut self) -> ParseResult<Condition> {
        let column = self.identifier("column name")?;
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            let test = if negated { Test::IsNotNull } else { Test::IsNull };
            return Ok(Condition { column, test });
        }
        let op = match self.peek().kind {
            TokenKind::Op(op) => {
                self.advance();
                op
            }
            _ => return Err(self.error_here("comparison operator or IS")),
        };
        let offset = self.peek().offset;
        let value = self.literal()?;
        if value.is_null() {
            return Err(ParseError::new(
                offset,
                "NULL cannot be compared; use IS NULL or IS NOT NULL",
            ));
        }
        Ok(Condition {
            column,
            test: Test::Compare(op, value),
        })
    }

    fn literal(&mut self) -> ParseResult<Value> {
        let token = self.peek().clone();
        let value = match &token.kind {
            TokenKind::Int(n) => Value::from(*n),
            TokenKind::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| ParseError::new(token.offset, "number is not finite"))?,
            TokenKind::Str(s) => Value::String(s.clone()),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("TRUE") => Value::Bool(true),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("FALSE") => Value::Bool(false),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("NULL") => Value::Null,
            _ => return Err(self.error_here("literal")),
        };
        self.advance();
        Ok(value)
    }
}

const RESERVED: &[&str] = &[
    "INSERT", "INTO", "VALUES", "SELECT", "FROM", "WHERE", "AND", "LIMIT", "IS", "NOT", "NULL",
    "TRUE", "FALSE",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}
