//! SQL-like Parser (C9, §4.7).
//!
//! A hand-rolled, deliberately restricted parser for the query's own
//! grammar — not a general SQL parser, since the grammar explicitly
//! excludes `OR` and parentheses and recognizes only one FROM target.

use super::{Filter, FilterCondition};
use crate::error::{LatticeError, Result};
use crate::port::Ordering;

/// The parsed form of a query string, prior to binding `from` to a
/// `collection_id` (that resolution happens one layer up, since C9 has no
/// Repository Port access).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub from: String,
    pub filters: Vec<Filter>,
    pub ordering: Ordering,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Star,
    Op(String),
    Eof,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' | ')' => {
                return Err(LatticeError::InvalidArgument(
                    "parenthesized WHERE clauses are not supported".into(),
                ))
            },
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            },
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(LatticeError::InvalidArgument("unterminated string literal".into()));
                    }
                    if chars[i] == quote {
                        if i + 1 < chars.len() && chars[i + 1] == quote {
                            s.push(quote);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Str(s));
            },
            '!' | '<' | '>' | '=' => {
                let mut op = String::from(c);
                if i + 1 < chars.len() {
                    let next = chars[i + 1];
                    if (c == '!' && next == '=') || (c == '<' && (next == '=' || next == '>')) || (c == '>' && next == '=')
                    {
                        op.push(next);
                        i += 1;
                    }
                }
                if op == "!" {
                    return Err(LatticeError::InvalidArgument("unexpected '!'".into()));
                }
                tokens.push(Token::Op(op));
                i += 1;
            },
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | '\'' | '"' | '!' | '<' | '>' | '=' | '*')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.is_empty() {
                    return Err(LatticeError::InvalidArgument(format!(
                        "unexpected character {c:?}"
                    )));
                }
                let is_number = {
                    let mut cs = word.chars();
                    match cs.next() {
                        Some(first) => (first.is_ascii_digit() || first == '-') && word[1..].chars().all(|ch| ch.is_ascii_digit() || ch == '.')
                            && word.chars().any(|ch| ch.is_ascii_digit()),
                        None => false,
                    }
                };
                if is_number {
                    tokens.push(Token::Number(word));
                } else {
                    tokens.push(Token::Ident(word));
                }
            },
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        match self.advance() {
            Token::Ident(s) if s.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(LatticeError::InvalidArgument(format!(
                "expected {keyword:?}, found {other:?}"
            ))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(LatticeError::InvalidArgument(format!(
                "expected an identifier, found {other:?}"
            ))),
        }
    }

    fn expect_number(&mut self) -> Result<u32> {
        match self.advance() {
            Token::Number(s) => s
                .parse::<u32>()
                .map_err(|_| LatticeError::InvalidArgument(format!("expected a non-negative integer, found {s:?}"))),
            other => Err(LatticeError::InvalidArgument(format!(
                "expected an integer, found {other:?}"
            ))),
        }
    }

    fn parse_query(&mut self) -> Result<ParsedQuery> {
        self.expect_keyword("SELECT")?;
        match self.advance() {
            Token::Star => {},
            other => {
                return Err(LatticeError::InvalidArgument(format!(
                    "expected '*', found {other:?}"
                )))
            },
        }
        self.expect_keyword("FROM")?;
        let from = self.expect_ident()?;

        let mut filters = Vec::new();
        if self.peek_keyword("WHERE") {
            self.advance();
            filters = self.parse_cond_list()?;
        }

        let mut ordering = Ordering::CreatedAscending;
        if self.peek_keyword("ORDER") {
            self.advance();
            self.expect_keyword("BY")?;
            ordering = self.parse_order_spec()?;
        }

        let mut limit = None;
        if self.peek_keyword("LIMIT") {
            self.advance();
            limit = Some(self.expect_number()?);
        }

        let mut offset = None;
        if self.peek_keyword("OFFSET") {
            self.advance();
            offset = Some(self.expect_number()?);
        }

        match self.peek() {
            Token::Eof => {},
            other => {
                return Err(LatticeError::InvalidArgument(format!(
                    "unexpected trailing input at {other:?}"
                )))
            },
        }

        Ok(ParsedQuery {
            from,
            filters,
            ordering,
            limit,
            offset,
        })
    }

    fn parse_cond_list(&mut self) -> Result<Vec<Filter>> {
        let mut conds = vec![self.parse_cond()?];
        loop {
            if self.peek_keyword("AND") {
                self.advance();
                conds.push(self.parse_cond()?);
            } else if self.peek_keyword("OR") {
                return Err(LatticeError::InvalidArgument(
                    "OR is not supported in WHERE clauses".into(),
                ));
            } else {
                break;
            }
        }
        Ok(conds)
    }

    fn parse_cond(&mut self) -> Result<Filter> {
        let field = self.expect_ident()?;

        if self.peek_keyword("IS") {
            self.advance();
            let negated = if self.peek_keyword("NOT") {
                self.advance();
                true
            } else {
                false
            };
            self.expect_keyword("NULL")?;
            let condition = if negated {
                FilterCondition::IsNotNull
            } else {
                FilterCondition::IsNull
            };
            return Ok(Filter { field, condition });
        }

        if self.peek_keyword("LIKE") {
            self.advance();
            let pattern = match self.advance() {
                Token::Str(s) => s,
                other => {
                    return Err(LatticeError::InvalidArgument(format!(
                        "expected a string after LIKE, found {other:?}"
                    )))
                },
            };
            return Ok(Filter {
                field,
                condition: classify_like(&pattern),
            });
        }

        let op = match self.advance() {
            Token::Op(op) => op,
            other => {
                return Err(LatticeError::InvalidArgument(format!(
                    "expected a comparison operator, found {other:?}"
                )))
            },
        };
        let value = match self.advance() {
            Token::Str(s) => s,
            Token::Number(s) => s,
            Token::Ident(s) => s,
            other => {
                return Err(LatticeError::InvalidArgument(format!(
                    "expected a value, found {other:?}"
                )))
            },
        };

        let condition = match op.as_str() {
            "=" => FilterCondition::Equals(value),
            "!=" | "<>" => FilterCondition::NotEquals(value),
            ">" => FilterCondition::GreaterThan(value),
            ">=" => FilterCondition::GreaterThanOrEqualTo(value),
            "<" => FilterCondition::LessThan(value),
            "<=" => FilterCondition::LessThanOrEqualTo(value),
            _ => return Err(LatticeError::InvalidArgument(format!("unknown operator {op:?}"))),
        };
        Ok(Filter { field, condition })
    }

    fn parse_order_spec(&mut self) -> Result<Ordering> {
        let field = self.expect_ident()?;
        let mut desc = false;
        if self.peek_keyword("ASC") {
            self.advance();
        } else if self.peek_keyword("DESC") {
            self.advance();
            desc = true;
        }
        Ok(map_order_field(&field, desc))
    }
}

fn map_order_field(field: &str, desc: bool) -> Ordering {
    match field.to_lowercase().as_str() {
        "createdutc" => {
            if desc {
                Ordering::CreatedDescending
            } else {
                Ordering::CreatedAscending
            }
        },
        "lastupdateutc" => {
            if desc {
                Ordering::LastUpdateDescending
            } else {
                Ordering::LastUpdateAscending
            }
        },
        "name" => {
            if desc {
                Ordering::NameDescending
            } else {
                Ordering::NameAscending
            }
        },
        _ => Ordering::CreatedAscending,
    }
}

/// Classify a `LIKE` pattern into the closed filter-condition set (§4.7):
/// `%x%` -> `Contains`, `%x` -> `EndsWith`, `x%` -> `StartsWith`, anything
/// else passes through as `Like`.
pub fn classify_like(pattern: &str) -> FilterCondition {
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%') && pattern.len() > 1;
    match (starts, ends) {
        (true, true) => FilterCondition::Contains(pattern[1..pattern.len() - 1].to_string()),
        (true, false) => FilterCondition::EndsWith(pattern[1..].to_string()),
        (false, true) => FilterCondition::StartsWith(pattern[..pattern.len() - 1].to_string()),
        (false, false) => FilterCondition::Like(pattern.to_string()),
    }
}

/// Parse a complete query string into its [`ParsedQuery`] form.
pub fn parse(input: &str) -> Result<ParsedQuery> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_query()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_scenario_4_query() {
        let parsed = parse("SELECT * FROM documents WHERE name = 'A' AND tags LIKE '%y%' LIMIT 1").unwrap();
        assert_eq!(parsed.from, "documents");
        assert_eq!(parsed.filters.len(), 2);
        assert_eq!(parsed.filters[0].condition, FilterCondition::Equals("A".into()));
        assert_eq!(parsed.filters[1].condition, FilterCondition::Contains("y".into()));
        assert_eq!(parsed.limit, Some(1));
    }

    #[test]
    fn rejects_or() {
        let err = parse("SELECT * FROM documents WHERE a = '1' OR b = '2'").unwrap_err();
        assert!(matches!(err, LatticeError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_parens() {
        let err = parse("SELECT * FROM documents WHERE (a = '1')").unwrap_err();
        assert!(matches!(err, LatticeError::InvalidArgument(_)));
    }

    #[test]
    fn doubled_quotes_escape_within_string_literals() {
        let parsed = parse("SELECT * FROM documents WHERE name = 'O''Brien'").unwrap();
        assert_eq!(parsed.filters[0].condition, FilterCondition::Equals("O'Brien".into()));
    }

    #[test]
    fn is_not_null_parses() {
        let parsed = parse("SELECT * FROM documents WHERE email IS NOT NULL").unwrap();
        assert_eq!(parsed.filters[0].condition, FilterCondition::IsNotNull);
    }

    #[test]
    fn order_by_recognizes_known_fields_case_insensitively() {
        let parsed = parse("SELECT * FROM documents ORDER BY CreatedUtc DESC").unwrap();
        assert_eq!(parsed.ordering, Ordering::CreatedDescending);
    }

    #[test]
    fn order_by_unknown_field_defaults_to_creation_order() {
        let parsed = parse("SELECT * FROM documents ORDER BY nonsense DESC").unwrap();
        assert_eq!(parsed.ordering, Ordering::CreatedAscending);
    }

    #[test]
    fn classify_like_patterns() {
        assert_eq!(classify_like("%x%"), FilterCondition::Contains("x".into()));
        assert_eq!(classify_like("%x"), FilterCondition::EndsWith("x".into()));
        assert_eq!(classify_like("x%"), FilterCondition::StartsWith("x".into()));
        assert_eq!(classify_like("x_y"), FilterCondition::Like("x_y".into()));
    }
}
