//! Parsing of command-line argument text into values.
//!
//! The grammar is fixed: booleans, null, numbers, quoted strings and
//! bracketed lists. Anything else is taken verbatim as a string. Text is
//! never evaluated.

use crate::error::{Error, Result};
use crate::value::Value;

/// Parse a literal.
pub fn parse_literal(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let starts_structured = trimmed.starts_with(['[', '(', '"', '\'']);
    if !starts_structured {
        return Ok(parse_scalar(trimmed).unwrap_or_else(|| Value::String(text.to_string())));
    }

    let mut parser = Parser {
        chars: trimmed.chars().collect(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(Error::Argument(format!(
            "unexpected trailing text in literal '{trimmed}'"
        )));
    }
    Ok(value)
}

fn parse_scalar(text: &str) -> Option<Value> {
    match text {
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        "null" | "None" => return Some(Value::Null),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::Int(n));
    }
    // Only finite decimal text; "inf", "-inf" and "nan" stay strings.
    if text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.')) {
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Some(Value::Float(f));
            }
        }
    }
    None
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some(open @ ('[' | '(')) => self.list(if open == '[' { ']' } else { ')' }),
            Some(quote @ ('"' | '\'')) => self.string(quote).map(Value::String),
            Some(_) => self.bare(),
            None => Err(Error::Argument("unexpected end of literal".into())),
        }
    }

    fn list(&mut self, close: char) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                None => return Err(Error::Argument(format!("missing closing '{close}'"))),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                Some(c) => {
                    return Err(Error::Argument(format!(
                        "expected ',' or '{close}', found '{c}'"
                    )));
                }
                None => return Err(Error::Argument(format!("missing closing '{close}'"))),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or_else(|| Error::Argument("dangling escape in string".into()))?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(Error::Argument(format!("unterminated string, missing {quote}")))
    }

    /// An unquoted element inside a list.
    fn bare(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | ']' | ')' | '[' | '(' | '"' | '\'') {
                break;
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Argument("empty list element".into()));
        }
        Ok(parse_scalar(text).unwrap_or_else(|| Value::String(text.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(parse_literal("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal("False").unwrap(), Value::Bool(false));
        assert_eq!(parse_literal("None").unwrap(), Value::Null);
        assert_eq!(parse_literal("-12").unwrap(), Value::Int(-12));
        assert_eq!(parse_literal("2.5e3").unwrap(), Value::Float(2500.0));
        assert_eq!(parse_literal("population").unwrap(), Value::from("population"));
        assert_eq!(parse_literal("nan").unwrap(), Value::from("nan"));
        for text in ["-inf", "+inf", "+nan", "1e999"] {
            assert_eq!(parse_literal(text).unwrap(), Value::from(text));
        }
    }

    #[test]
    fn test_raw_text_is_kept_verbatim() {
        assert_eq!(parse_literal("10.0, 53.5").unwrap(), Value::from("10.0, 53.5"));
        assert_eq!(
            parse_literal("__import__('os')").unwrap(),
            Value::from("__import__('os')")
        );
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(parse_literal("'42'").unwrap(), Value::from("42"));
        assert_eq!(parse_literal(r#""a\"b\n""#).unwrap(), Value::from("a\"b\n"));
        assert!(matches!(parse_literal("'open"), Err(Error::Argument(_))));
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            parse_literal("[1, 2.5, 'x', [true, None]]").unwrap(),
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::List(vec![Value::Bool(true), Value::Null]),
            ])
        );
        assert_eq!(
            parse_literal("(0, 0, 2, 2)").unwrap(),
            Value::from(vec![0i64, 0, 2, 2])
        );
        assert_eq!(parse_literal("[]").unwrap(), Value::List(vec![]));
        assert_eq!(parse_literal("[1,]").unwrap(), Value::from(vec![1i64]));
    }

    #[test]
    fn test_malformed_lists() {
        assert!(matches!(parse_literal("[1, 2"), Err(Error::Argument(_))));
        assert!(matches!(parse_literal("[1 2] x"), Err(Error::Argument(_))));
        assert!(matches!(parse_literal("[1, , 2]"), Err(Error::Argument(_))));
    }
}
