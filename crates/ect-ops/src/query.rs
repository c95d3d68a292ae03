//! Row filter expressions for `data_frame_query`.
//!
//! ```text
//! expr       := or
//! or         := and (("or" | "|") and)*
//! and        := unary (("and" | "&") unary)*
//! unary      := ("not" | "~") unary | primary
//! primary    := "(" expr ")" | "@" NAME "(" STRING ")" | operand (CMP operand)?
//! operand    := NAME | `quoted name` | NUMBER | STRING | True | False
//! CMP        := == | != | < | <= | > | >=
//! ```
//!
//! An operand without comparison is true when it is boolean `true`.

use ect_core::{GeoDataFrame, Geometry, OpError, Row, Table, Tabular, Value};
use std::cmp::Ordering;

/// Decimal places used by `@almost_equals`.
const ALMOST_EQUALS_DECIMAL: i32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Or(Box<Query>, Box<Query>),
    And(Box<Query>, Box<Query>),
    Not(Box<Query>),
    Compare(Operand, CmpOp, Operand),
    Truthy(Operand),
    Geo(GeoTest, Geometry),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoTest {
    AlmostEquals,
    Contains,
    Crosses,
    Disjoint,
    Intersects,
    Touches,
    Within,
}

impl GeoTest {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "almost_equals" => GeoTest::AlmostEquals,
            "contains" => GeoTest::Contains,
            "crosses" => GeoTest::Crosses,
            "disjoint" => GeoTest::Disjoint,
            "intersects" => GeoTest::Intersects,
            "touches" => GeoTest::Touches,
            "within" => GeoTest::Within,
            _ => return None,
        })
    }

    fn apply(self, feature: &Geometry, other: &Geometry) -> bool {
        match self {
            GeoTest::AlmostEquals => feature.almost_equals(other, ALMOST_EQUALS_DECIMAL),
            GeoTest::Contains => feature.contains(other),
            GeoTest::Crosses => feature.crosses(other),
            GeoTest::Disjoint => feature.disjoint(other),
            GeoTest::Intersects => feature.intersects(other),
            GeoTest::Touches => feature.touches(other),
            GeoTest::Within => feature.within(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Number(Value),
    Str(String),
    Op(CmpOp),
    And,
    Or,
    Not,
    At,
    LParen,
    RParen,
}

fn invalid(msg: impl Into<String>) -> OpError {
    OpError::InvalidInput(msg.into())
}

fn tokenize(text: &str) -> Result<Vec<Token>, OpError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(invalid(format!("unexpected '{c}' at position {i}"))),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '\'' | '"' | '`' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|offset| start + offset)
                    .ok_or_else(|| invalid(format!("unterminated {quote} at position {i}")))?;
                let content: String = chars[start..end].iter().collect();
                tokens.push(if quote == '`' {
                    Token::Name(content)
                } else {
                    Token::Str(content)
                });
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric()
                        || chars[i] == '.'
                        || (matches!(chars[i], '-' | '+') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| text.parse::<f64>().map(Value::Float))
                    .map_err(|_| invalid(format!("invalid number '{text}'")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Name(word),
                });
            }
            other => return Err(invalid(format!("unexpected '{other}' at position {i}"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), OpError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            _ => Err(invalid(format!("expected {what}"))),
        }
    }

    fn or(&mut self) -> Result<Query, OpError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Query::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Query, OpError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Query::And(Box::new(left), Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Query, OpError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Query::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Query, OpError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::At) => {
                self.pos += 1;
                let name = match self.next() {
                    Some(Token::Name(name)) => name,
                    _ => return Err(invalid("expected a geometric test after '@'")),
                };
                let test = GeoTest::from_name(&name)
                    .ok_or_else(|| invalid(format!("unknown geometric test '@{name}'")))?;
                self.expect(&Token::LParen, "'(' after geometric test")?;
                let geometry = match self.next() {
                    Some(Token::Str(text)) => Geometry::parse(&text)
                        .map_err(|e| invalid(format!("@{name}: {e}")))?,
                    _ => return Err(invalid(format!("@{name} expects a quoted geometry"))),
                };
                self.expect(&Token::RParen, "')'")?;
                Ok(Query::Geo(test, geometry))
            }
            _ => {
                let left = self.operand()?;
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.pos += 1;
                    let right = self.operand()?;
                    Ok(Query::Compare(left, op, right))
                } else {
                    Ok(Query::Truthy(left))
                }
            }
        }
    }

    fn operand(&mut self) -> Result<Operand, OpError> {
        match self.next() {
            Some(Token::Name(name)) => Ok(match name.as_str() {
                "True" | "true" => Operand::Literal(Value::Bool(true)),
                "False" | "false" => Operand::Literal(Value::Bool(false)),
                _ => Operand::Column(name),
            }),
            Some(Token::Number(value)) => Ok(Operand::Literal(value)),
            Some(Token::Str(text)) => Ok(Operand::Literal(Value::String(text))),
            Some(token) => Err(invalid(format!("unexpected {token:?}"))),
            None => Err(invalid("unexpected end of expression")),
        }
    }
}

impl Query {
    /// Parse a query expression.
    pub fn parse(text: &str) -> Result<Self, OpError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(invalid("empty query expression"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected trailing input in '{text}'"
            )));
        }
        Ok(query)
    }

    /// Check column references and geometric tests against a table.
    pub fn check(&self, table: &Table) -> Result<(), OpError> {
        match self {
            Query::Or(a, b) | Query::And(a, b) => {
                a.check(table)?;
                b.check(table)
            }
            Query::Not(inner) => inner.check(table),
            Query::Compare(left, _, right) => {
                check_operand(left, table)?;
                check_operand(right, table)
            }
            Query::Truthy(operand) => check_operand(operand, table),
            Query::Geo(..) if table.is_geo() => Ok(()),
            Query::Geo(..) => Err(invalid(
                "geometric tests need a table with a geometry column",
            )),
        }
    }

    /// Evaluate for one row.
    pub fn matches(&self, row: Row<'_>, geo: Option<&GeoDataFrame>) -> bool {
        match self {
            Query::Or(a, b) => a.matches(row, geo) || b.matches(row, geo),
            Query::And(a, b) => a.matches(row, geo) && b.matches(row, geo),
            Query::Not(inner) => !inner.matches(row, geo),
            Query::Compare(left, op, right) => {
                match (resolve(left, row), resolve(right, row)) {
                    (Some(l), Some(r)) => compare(l, *op, r),
                    _ => *op == CmpOp::Ne,
                }
            }
            Query::Truthy(operand) => resolve(operand, row) == Some(&Value::Bool(true)),
            Query::Geo(test, geometry) => geo
                .and_then(|g| g.geometry(row.index()))
                .is_some_and(|feature| test.apply(feature, geometry)),
        }
    }
}

fn check_operand(operand: &Operand, table: &Table) -> Result<(), OpError> {
    match operand {
        Operand::Column(name) if !table.columns().iter().any(|c| c == name) => {
            Err(invalid(format!("unknown column '{name}' in query")))
        }
        _ => Ok(()),
    }
}

/// Cell or literal value; null cells resolve to nothing.
fn resolve<'a>(operand: &'a Operand, row: Row<'a>) -> Option<&'a Value> {
    let value = match operand {
        Operand::Column(name) => row.get(name)?,
        Operand::Literal(value) => value,
    };
    (!value.is_null()).then_some(value)
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    let ordering = left.compare(right);
    match op {
        CmpOp::Eq => ordering == Some(Ordering::Equal) || (ordering.is_none() && left == right),
        CmpOp::Ne => !compare(left, CmpOp::Eq, right),
        CmpOp::Lt => ordering == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}
