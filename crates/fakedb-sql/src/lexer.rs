//! Tokenizer.
//!
//! Keywords are not distinguished from identifiers here; the parser matches
//! bare words case-insensitively. A double-quoted word is always an
//! identifier, which allows names such as `"user-events"`.

use crate::ast::CompareOp;
use crate::error::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: keyword or identifier.
    Word(String),
    /// Double-quoted identifier.
    QuotedIdent(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Star,
    Semicolon,
    Op(CompareOp),
    Eof,
}

impl TokenKind {
    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Word(w) => format!("'{w}'"),
            Self::QuotedIdent(w) => format!("\"{w}\""),
            Self::Int(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Str(_) => "string literal".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Comma => "','".into(),
            Self::Star => "'*'".into(),
            Self::Semicolon => "';'".into(),
            Self::Op(op) => format!("'{}'", op.as_str()),
            Self::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

/// Split `input` into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        let kind = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos += 1;
                continue;
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'*' => {
                pos += 1;
                TokenKind::Star
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'=' => {
                pos += 1;
                TokenKind::Op(CompareOp::Eq)
            }
            b'!' => {
                if bytes.get(pos + 1) != Some(&b'=') {
                    return Err(ParseError::new(start, "expected '=' after '!'"));
                }
                pos += 2;
                TokenKind::Op(CompareOp::NotEq)
            }
            b'<' => match bytes.get(pos + 1) {
                Some(b'=') => {
                    pos += 2;
                    TokenKind::Op(CompareOp::LtEq)
                }
                Some(b'>') => {
                    pos += 2;
                    TokenKind::Op(CompareOp::NotEq)
                }
                _ => {
                    pos += 1;
                    TokenKind::Op(CompareOp::Lt)
                }
            },
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    TokenKind::Op(CompareOp::GtEq)
                } else {
                    pos += 1;
                    TokenKind::Op(CompareOp::Gt)
                }
            }
            b'\'' => {
                let (text, end) = quoted(input, start, b'\'')?;
                pos = end;
                TokenKind::Str(text)
            }
            b'"' => {
                let (text, end) = quoted(input, start, b'"')?;
                if text.is_empty() {
                    return Err(ParseError::new(start, "empty quoted identifier"));
                }
                pos = end;
                TokenKind::QuotedIdent(text)
            }
            b'0'..=b'9' => {
                let (kind, end) = number(input, start)?;
                pos = end;
                kind
            }
            b'-' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                let (kind, end) = number(input, start)?;
                pos = end;
                kind
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                TokenKind::Word(input[start..pos].to_string())
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(start, format!("unexpected character {ch:?}")));
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
    });
    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled quote escapes itself.
fn quoted(input: &str, start: usize, quote: u8) -> ParseResult<(String, usize)> {
    let bytes = input.as_bytes();
    let mut pos = start + 1;
    let mut text = String::new();
    let mut run = pos;
    loop {
        match bytes.get(pos) {
            None => return Err(ParseError::new(start, "unterminated quoted text")),
            Some(&b) if b == quote => {
                text.push_str(&input[run..pos]);
                if bytes.get(pos + 1) == Some(&quote) {
                    text.push(quote as char);
                    pos += 2;
                    run = pos;
                } else {
                    return Ok((text, pos + 1));
                }
            }
            Some(_) => pos += 1,
        }
    }
}

fn number(input: &str, start: usize) -> ParseResult<(TokenKind, usize)> {
    let bytes = input.as_bytes();
    let mut pos = start;
    if bytes[pos] == b'-' {
        pos += 1;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut is_float = false;
    if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if bytes
        .get(pos)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
    {
        return Err(ParseError::new(start, "malformed number"));
    }

    let text = &input[start..pos];
    let kind = if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|e| ParseError::new(start, format!("bad number {text}: {e}")))?
    } else {
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|e| ParseError::new(start, format!("bad number {text}: {e}")))?
    };
    Ok((kind, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn symbols_and_operators() {
        assert_eq!(
            kinds("( ) , * ; = != <> < <= > >="),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Comma,
                TokenKind::Star,
                TokenKind::Semicolon,
                TokenKind::Op(CompareOp::Eq),
                TokenKind::Op(CompareOp::NotEq),
                TokenKind::Op(CompareOp::NotEq),
                TokenKind::Op(CompareOp::Lt),
                TokenKind::Op(CompareOp::LtEq),
                TokenKind::Op(CompareOp::Gt),
                TokenKind::Op(CompareOp::GtEq),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            kinds("42 -7 2.5 'it''s' \"user-events\" name"),
            vec![
                TokenKind::Int(42),
                TokenKind::Int(-7),
                TokenKind::Float(2.5),
                TokenKind::Str("it's".into()),
                TokenKind::QuotedIdent("user-events".into()),
                TokenKind::Word("name".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn offsets_are_bytes() {
        let tokens = tokenize("SELECT  'é' , x").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        // 'é' is two bytes in UTF-8.
        assert_eq!(offsets, vec![0, 8, 13, 15, 16]);
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let err = tokenize("SELECT 'abc").unwrap_err();
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn stray_characters_fail() {
        assert_eq!(tokenize("a # b").unwrap_err().offset, 2);
        assert_eq!(tokenize("a ! b").unwrap_err().offset, 2);
        assert!(tokenize("12abc").is_err());
        assert!(tokenize("99999999999999999999").is_err());
    }
}
