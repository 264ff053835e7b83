//! Parser for the PartiQL-like statement subset.
//!
//! Supported forms:
//!
//! ```text
//! INSERT INTO "t" VALUE {'PK': 'a', 'SK': 'b', ...}
//! UPDATE "t" SET "a"='x' SET "b"[0]=1 REMOVE "c" WHERE PK='a' AND SK='b' AND RowVersion=3
//! DELETE FROM "t" WHERE PK='a' AND SK='b'
//! SELECT * FROM "t" WHERE PK IN ('a', 'b') AND RowType='account'
//! EXISTS(SELECT * FROM "t" WHERE PK='a' AND SK='b' AND RowVersion=3)
//! ```

use crate::error::{ClientError, ClientResult};
use crate::types::values_equal;
use std::cmp::Ordering;
use tabula_codec::{AttributePath, AttributeValue, Attributes, PathSegment};

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Insert a new item; fails if the key exists.
    Insert {
        /// Target table.
        table: String,
        /// The full item.
        item: Attributes,
    },
    /// Partially update an existing item.
    Update {
        /// Target table.
        table: String,
        /// `SET path=value` clauses, in order.
        sets: Vec<(AttributePath, AttributeValue)>,
        /// `REMOVE path` clauses, in order.
        removes: Vec<AttributePath>,
        /// WHERE terms.
        predicate: Vec<Term>,
    },
    /// Delete an item.
    Delete {
        /// Target table.
        table: String,
        /// WHERE terms.
        predicate: Vec<Term>,
    },
    /// Read items.
    Select {
        /// Target table.
        table: String,
        /// Attributes to return.
        projection: Projection,
        /// WHERE terms.
        predicate: Vec<Term>,
    },
    /// Assert an item matching the predicate exists.
    Exists {
        /// Target table.
        table: String,
        /// WHERE terms.
        predicate: Vec<Term>,
    },
}

impl Statement {
    /// Returns the table this statement targets.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. }
            | Statement::Select { table, .. }
            | Statement::Exists { table, .. } => table,
        }
    }

    /// Returns the WHERE terms, if the statement has any.
    pub fn predicate(&self) -> &[Term] {
        match self {
            Statement::Insert { .. } => &[],
            Statement::Update { predicate, .. }
            | Statement::Delete { predicate, .. }
            | Statement::Select { predicate, .. }
            | Statement::Exists { predicate, .. } => predicate,
        }
    }
}

/// Attributes returned by a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    All,
    /// A list of top-level attribute names.
    Attributes(Vec<String>),
}

impl Projection {
    /// Applies this projection to an item.
    pub fn apply(&self, item: &Attributes) -> Attributes {
        match self {
            Projection::All => item.clone(),
            Projection::Attributes(names) => names
                .iter()
                .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
        }
    }
}

/// One `attribute <op> literal` term of a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Top-level attribute name.
    pub attribute: String,
    /// Comparison applied to the attribute.
    pub comparison: Comparison,
}

/// Comparison operator and operand(s) of a [`Term`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Equals(AttributeValue),
    /// `<>`
    NotEquals(AttributeValue),
    /// `<`
    LessThan(AttributeValue),
    /// `<=`
    LessThanOrEqual(AttributeValue),
    /// `>`
    GreaterThan(AttributeValue),
    /// `>=`
    GreaterThanOrEqual(AttributeValue),
    /// `IN (...)`
    In(Vec<AttributeValue>),
}

impl Term {
    /// Returns true if `item` satisfies this term.
    pub fn matches(&self, item: &Attributes) -> bool {
        let Some(actual) = item.get(&self.attribute) else {
            return false;
        };
        match &self.comparison {
            Comparison::Equals(v) => values_equal(actual, v),
            Comparison::NotEquals(v) => !values_equal(actual, v),
            Comparison::LessThan(v) => compare(actual, v) == Some(Ordering::Less),
            Comparison::LessThanOrEqual(v) => {
                matches!(compare(actual, v), Some(Ordering::Less | Ordering::Equal))
            }
            Comparison::GreaterThan(v) => compare(actual, v) == Some(Ordering::Greater),
            Comparison::GreaterThanOrEqual(v) => {
                matches!(compare(actual, v), Some(Ordering::Greater | Ordering::Equal))
            }
            Comparison::In(values) => values.iter().any(|v| values_equal(actual, v)),
        }
    }

    /// Returns the single value this term pins the attribute to, if it is an
    /// equality.
    pub fn equality_value(&self) -> Option<&AttributeValue> {
        match &self.comparison {
            Comparison::Equals(v) => Some(v),
            _ => None,
        }
    }
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            a.parse::<f64>().ok()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

/// Parses statement text.
pub fn parse_statement(text: &str) -> ClientResult<Statement> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    if parser.pos != parser.tokens.len() {
        return Err(invalid(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(statement)
}

fn invalid(message: impl Into<String>) -> ClientError {
    ClientError::validation(message)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Str(String),
    Num(String),
    Sym(&'static str),
}

const SYMBOLS: [&str; 19] = [
    "<<", ">>", "<=", ">=", "<>", "!=", "=", "<", ">", ",", "(", ")", "[", "]", "{", "}", ".",
    ":", "*",
];

fn tokenize(text: &str) -> ClientResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' || c == '"' {
            let (content, next) = quoted(&chars, i, c)?;
            tokens.push(if c == '\'' {
                Token::Str(content)
            } else {
                Token::Quoted(content)
            });
            i = next;
        } else if c.is_ascii_digit()
            || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let start = i;
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign =
                    (d == '-' || d == '+') && matches!(chars[i - 1], 'e' | 'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Num(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let symbol = SYMBOLS
                .iter()
                .find(|s| rest.starts_with(**s))
                .ok_or_else(|| invalid(format!("unexpected character '{c}'")))?;
            tokens.push(Token::Sym(*symbol));
            i += symbol.len();
        }
    }

    Ok(tokens)
}

/// Reads a quoted run starting at `start`; a doubled quote is an escaped quote.
fn quoted(chars: &[char], start: usize, quote: char) -> ClientResult<(String, usize)> {
    let mut content = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(invalid("unterminated quoted text")),
            Some(&c) if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    content.push(quote);
                    i += 2;
                } else {
                    return Ok((content, i + 1));
                }
            }
            Some(&c) => {
                content.push(c);
                i += 1;
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> ClientResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| invalid("unexpected end of statement"))?;
        self.pos += 1;
        Ok(token)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ClientResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(invalid(format!("expected {keyword}")))
        }
    }

    fn eat_sym(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, symbol: &str) -> ClientResult<()> {
        if self.eat_sym(symbol) {
            Ok(())
        } else {
            Err(invalid(format!("expected '{symbol}'")))
        }
    }

    fn statement(&mut self) -> ClientResult<Statement> {
        if self.eat_keyword("INSERT") {
            self.expect_keyword("INTO")?;
            let table = self.name()?;
            self.expect_keyword("VALUE")?;
            match self.literal()? {
                AttributeValue::M(item) => Ok(Statement::Insert { table, item }),
                other => Err(invalid(format!("INSERT requires a map, found {}", other.kind()))),
            }
        } else if self.eat_keyword("UPDATE") {
            self.update()
        } else if self.eat_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.name()?;
            self.expect_keyword("WHERE")?;
            let predicate = self.predicate()?;
            Ok(Statement::Delete { table, predicate })
        } else if self.eat_keyword("SELECT") {
            self.select()
        } else if self.eat_keyword("EXISTS") {
            self.expect_sym("(")?;
            self.expect_keyword("SELECT")?;
            let statement = self.select()?;
            self.expect_sym(")")?;
            match statement {
                Statement::Select {
                    table, predicate, ..
                } => Ok(Statement::Exists { table, predicate }),
                _ => Err(invalid("EXISTS requires a SELECT")),
            }
        } else {
            Err(invalid("unsupported statement"))
        }
    }

    fn update(&mut self) -> ClientResult<Statement> {
        let table = self.name()?;
        let mut sets = Vec::new();
        let mut removes = Vec::new();
        loop {
            if self.eat_keyword("SET") {
                loop {
                    let path = self.path()?;
                    self.expect_sym("=")?;
                    sets.push((path, self.literal()?));
                    if !self.eat_sym(",") {
                        break;
                    }
                }
            } else if self.eat_keyword("REMOVE") {
                loop {
                    removes.push(self.path()?);
                    if !self.eat_sym(",") {
                        break;
                    }
                }
            } else {
                break;
            }
        }
        if sets.is_empty() && removes.is_empty() {
            return Err(invalid("UPDATE requires at least one SET or REMOVE"));
        }
        self.expect_keyword("WHERE")?;
        let predicate = self.predicate()?;
        Ok(Statement::Update {
            table,
            sets,
            removes,
            predicate,
        })
    }

    fn select(&mut self) -> ClientResult<Statement> {
        let projection = if self.eat_sym("*") {
            Projection::All
        } else {
            let mut names = vec![self.name()?];
            while self.eat_sym(",") {
                names.push(self.name()?);
            }
            Projection::Attributes(names)
        };
        self.expect_keyword("FROM")?;
        let table = self.name()?;
        let predicate = if self.eat_keyword("WHERE") {
            self.predicate()?
        } else {
            Vec::new()
        };
        Ok(Statement::Select {
            table,
            projection,
            predicate,
        })
    }

    fn name(&mut self) -> ClientResult<String> {
        match self.next()? {
            Token::Quoted(name) | Token::Word(name) => Ok(name),
            other => Err(invalid(format!("expected a name, found {other:?}"))),
        }
    }

    fn path(&mut self) -> ClientResult<AttributePath> {
        let mut segments = vec![PathSegment::Attribute(self.name()?)];
        loop {
            if self.eat_sym(".") {
                segments.push(PathSegment::Attribute(self.name()?));
            } else if self.eat_sym("[") {
                let index = match self.next()? {
                    Token::Num(n) => n
                        .parse::<usize>()
                        .map_err(|_| invalid(format!("invalid list index {n}")))?,
                    other => return Err(invalid(format!("expected an index, found {other:?}"))),
                };
                self.expect_sym("]")?;
                segments.push(PathSegment::Index(index));
            } else {
                break;
            }
        }
        AttributePath::from_segments(segments).ok_or_else(|| invalid("invalid path"))
    }

    fn predicate(&mut self) -> ClientResult<Vec<Term>> {
        let mut terms = vec![self.term()?];
        while self.eat_keyword("AND") {
            terms.push(self.term()?);
        }
        Ok(terms)
    }

    fn term(&mut self) -> ClientResult<Term> {
        let attribute = self.name()?;
        let comparison = if self.eat_keyword("IN") {
            self.expect_sym("(")?;
            let mut values = vec![self.literal()?];
            while self.eat_sym(",") {
                values.push(self.literal()?);
            }
            self.expect_sym(")")?;
            Comparison::In(values)
        } else {
            match self.next()? {
                Token::Sym("=") => Comparison::Equals(self.literal()?),
                Token::Sym("<>") | Token::Sym("!=") => Comparison::NotEquals(self.literal()?),
                Token::Sym("<") => Comparison::LessThan(self.literal()?),
                Token::Sym("<=") => Comparison::LessThanOrEqual(self.literal()?),
                Token::Sym(">") => Comparison::GreaterThan(self.literal()?),
                Token::Sym(">=") => Comparison::GreaterThanOrEqual(self.literal()?),
                other => return Err(invalid(format!("expected an operator, found {other:?}"))),
            }
        };
        Ok(Term {
            attribute,
            comparison,
        })
    }

    fn literal(&mut self) -> ClientResult<AttributeValue> {
        match self.next()? {
            Token::Str(s) => Ok(AttributeValue::S(s)),
            Token::Num(n) => Ok(AttributeValue::N(n)),
            Token::Word(w) if w.eq_ignore_ascii_case("true") => Ok(AttributeValue::Bool(true)),
            Token::Word(w) if w.eq_ignore_ascii_case("false") => Ok(AttributeValue::Bool(false)),
            Token::Word(w) if w.eq_ignore_ascii_case("null") => Ok(AttributeValue::Null),
            Token::Sym("[") => {
                let mut items = Vec::new();
                if !self.eat_sym("]") {
                    loop {
                        items.push(self.literal()?);
                        if self.eat_sym("]") {
                            break;
                        }
                        self.expect_sym(",")?;
                    }
                }
                Ok(AttributeValue::L(items))
            }
            Token::Sym("{") => {
                let mut fields = Attributes::new();
                if !self.eat_sym("}") {
                    loop {
                        let name = match self.next()? {
                            Token::Str(name) | Token::Quoted(name) => name,
                            other => {
                                return Err(invalid(format!("expected a key, found {other:?}")))
                            }
                        };
                        self.expect_sym(":")?;
                        fields.insert(name, self.literal()?);
                        if self.eat_sym("}") {
                            break;
                        }
                        self.expect_sym(",")?;
                    }
                }
                Ok(AttributeValue::M(fields))
            }
            Token::Sym("<<") => {
                let mut items = vec![self.literal()?];
                while self.eat_sym(",") {
                    items.push(self.literal()?);
                }
                self.expect_sym(">>")?;
                set_literal(items)
            }
            other => Err(invalid(format!("expected a literal, found {other:?}"))),
        }
    }
}

fn set_literal(items: Vec<AttributeValue>) -> ClientResult<AttributeValue> {
    if items.iter().all(|v| matches!(v, AttributeValue::S(_))) {
        Ok(AttributeValue::SS(
            items.into_iter().filter_map(|v| v.as_s().map(str::to_string)).collect(),
        ))
    } else if items.iter().all(|v| matches!(v, AttributeValue::N(_))) {
        Ok(AttributeValue::NS(
            items.into_iter().filter_map(|v| v.as_n().map(str::to_string)).collect(),
        ))
    } else {
        Err(invalid("set literals must hold only strings or only numbers"))
    }
}
