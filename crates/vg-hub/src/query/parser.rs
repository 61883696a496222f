//! # Filter Parser
//!
//! Parses a human-typed filter into a [`Predicate`], validated against the
//! Field Registry of the queried entity type.
//!
//! Grammar:
//! ```text
//! filter  := clause*
//! clause  := FIELD op value
//! op      := "=" | "!=" | ">" | "<" | "contains"
//! value   := WORD | "quoted string"
//! ```
//!
//! Compact clauses (`priority<3`) and spaced clauses (`priority < 3`) are
//! equivalent. `contains` takes a quoted literal, or every bare word up to
//! the next `FIELD op` boundary joined by single spaces, so
//! `msg contains buffer overflow priority<3` searches for `buffer overflow`.
//! All other operators take exactly one value token.

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use vg_core::{describe, EntityKind, FieldKind, Operator};

use super::{Comparison, Literal, Predicate};
use crate::error::QueryError;

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    Quoted(String),
    Op(Operator),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn ident_re() -> &'static Regex {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    IDENT_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("valid identifier regex")
    })
}

fn is_op_start(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'=' | b'<' | b'>' => true,
        b'!' => bytes.get(i + 1) == Some(&b'='),
        _ => false,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if c == b'"' {
            let mut value = String::new();
            let mut chars = input[i + 1..].char_indices();
            let mut closed = None;
            while let Some((off, ch)) = chars.next() {
                match ch {
                    '"' => {
                        closed = Some(i + 1 + off + 1);
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, esc @ ('"' | '\\'))) => value.push(esc),
                        Some((_, other)) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => break,
                    },
                    other => value.push(other),
                }
            }
            let Some(end) = closed else {
                return Err(QueryError::syntax(start, "unterminated quoted literal"));
            };
            tokens.push(Token {
                kind: TokenKind::Quoted(value),
                offset: start,
            });
            i = end;
            continue;
        }

        if is_op_start(bytes, i) {
            let (op, len) = match c {
                b'!' => (Operator::Ne, 2),
                b'=' => (Operator::Eq, 1),
                b'>' => (Operator::Gt, 1),
                _ => (Operator::Lt, 1),
            };
            tokens.push(Token {
                kind: TokenKind::Op(op),
                offset: start,
            });
            i += len;
            continue;
        }

        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'"'
            && !is_op_start(bytes, i)
        {
            i += 1;
        }
        tokens.push(Token {
            kind: TokenKind::Word(input[start..i].to_string()),
            offset: start,
        });
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

fn is_contains(token: Option<&Token>) -> bool {
    matches!(token, Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case("contains"))
}

fn operator_at(tokens: &[Token], i: usize) -> Option<Operator> {
    match tokens.get(i) {
        Some(Token {
            kind: TokenKind::Op(op),
            ..
        }) => Some(*op),
        t if is_contains(t) => Some(Operator::Contains),
        _ => None,
    }
}

/// Whether a new clause starts at `i`: a bare word followed by an operator.
fn clause_starts_at(tokens: &[Token], i: usize) -> bool {
    matches!(
        tokens.get(i),
        Some(Token {
            kind: TokenKind::Word(_),
            ..
        })
    ) && operator_at(tokens, i + 1).is_some()
}

/// Parse `expression` for `entity`. An empty expression matches everything.
pub fn parse(entity: EntityKind, expression: &str) -> Result<Predicate, QueryError> {
    let tokens = tokenize(expression)?;
    let mut clauses = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let name = match &tokens[i].kind {
            TokenKind::Word(w) if ident_re().is_match(w) => w.as_str(),
            TokenKind::Word(w) => {
                return Err(QueryError::syntax(
                    tokens[i].offset,
                    format!("'{}' is not a field name", w),
                ))
            }
            TokenKind::Quoted(_) => {
                return Err(QueryError::syntax(
                    tokens[i].offset,
                    "expected a field name, found a quoted literal",
                ))
            }
            TokenKind::Op(op) => {
                return Err(QueryError::syntax(
                    tokens[i].offset,
                    format!("expected a field name, found '{}'", op),
                ))
            }
        };

        let descriptor = describe(entity, name).ok_or_else(|| QueryError::UnknownField {
            entity,
            field: name.to_string(),
        })?;

        let op_offset = tokens
            .get(i + 1)
            .map(|t| t.offset)
            .unwrap_or(expression.len());
        let op = operator_at(&tokens, i + 1).ok_or_else(|| {
            QueryError::syntax(op_offset, format!("expected an operator after '{}'", name))
        })?;
        if !descriptor.allows(op) {
            return Err(QueryError::UnsupportedOperator {
                field: descriptor.name.to_string(),
                op,
                kind: descriptor.kind,
            });
        }
        i += 2;

        let value_offset = tokens.get(i).map(|t| t.offset).unwrap_or(expression.len());
        let raw = match tokens.get(i).map(|t| &t.kind) {
            Some(TokenKind::Quoted(q)) => {
                i += 1;
                q.clone()
            }
            Some(TokenKind::Word(_)) if op == Operator::Contains => {
                let mut words = Vec::new();
                while let Some(Token {
                    kind: TokenKind::Word(w),
                    ..
                }) = tokens.get(i)
                {
                    if !words.is_empty() && clause_starts_at(&tokens, i) {
                        break;
                    }
                    words.push(w.as_str());
                    i += 1;
                }
                words.join(" ")
            }
            Some(TokenKind::Word(w)) => {
                i += 1;
                w.clone()
            }
            Some(TokenKind::Op(found)) => {
                return Err(QueryError::syntax(
                    value_offset,
                    format!("expected a value for '{}', found '{}'", name, found),
                ))
            }
            None => {
                return Err(QueryError::syntax(
                    value_offset,
                    format!("missing value for '{}'", name),
                ))
            }
        };

        let value = normalize(descriptor.name, descriptor.kind, raw)?;
        clauses.push(Comparison {
            field: descriptor.name,
            kind: descriptor.kind,
            op,
            value,
        });
    }

    Ok(Predicate { clauses })
}

/// Convert a raw value into the typed literal for `kind`.
fn normalize(field: &str, kind: FieldKind, raw: String) -> Result<Literal, QueryError> {
    let invalid = |raw: String| QueryError::InvalidLiteral {
        field: field.to_string(),
        value: raw,
        kind,
    };
    match kind {
        FieldKind::String => Ok(Literal::Str(raw)),
        FieldKind::Integer | FieldKind::Port => match raw.parse::<i64>() {
            Ok(n) => Ok(Literal::Int(n)),
            Err(_) => Err(invalid(raw)),
        },
        FieldKind::Ip => match raw.parse::<IpAddr>() {
            Ok(ip) => Ok(Literal::Ip(ip.to_canonical())),
            Err(_) => Err(invalid(raw)),
        },
    }
}
