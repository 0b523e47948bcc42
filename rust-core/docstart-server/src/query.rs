// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Query service: parses statements, binds parameters, and evaluates them
//! against the in-memory store.
//!
//! The dialect covers single-keyspace lookups: a projection, a conjunction
//! of comparisons, and paging.
//!
//! ## Supported Statements
//!
//! - `SELECT * FROM `bucket``
//! - `SELECT a, b.c FROM `bucket`.`scope`.`collection``
//! - `... WHERE path = $name AND path LIKE '%x' AND path != $1`
//! - `... LIMIT n OFFSET m`
//!
//! `SELECT *` rows wrap each document under the keyspace alias (the last
//! keyspace part), e.g. `{"default": {...}}`. Projected rows only contain
//! fields that are present in the document.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

use crate::store::{DocumentStore, Keyspace, StoreError};

/// Error code for statements that fail to parse.
pub const SYNTAX_ERROR: u32 = 3000;
/// Error code for parameters referenced but not supplied.
pub const MISSING_PARAMETER: u32 = 4040;
/// Error code for evaluation failures.
pub const EVALUATION_ERROR: u32 = 5000;
/// Error code for unknown keyspaces.
pub const KEYSPACE_NOT_FOUND: u32 = 12003;

/// Words that cannot be used as unquoted identifiers.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "LIKE", "NOT", "LIMIT", "OFFSET", "TRUE", "FALSE", "NULL",
];

/// A query-service error, carrying the numeric code reported to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct QueryError {
    pub code: u32,
    pub message: String,
}

impl QueryError {
    fn syntax(message: impl Into<String>) -> Self {
        Self {
            code: SYNTAX_ERROR,
            message: format!("syntax error - {}", message.into()),
        }
    }

    fn missing(name: impl std::fmt::Display) -> Self {
        Self {
            code: MISSING_PARAMETER,
            message: format!("No value for parameter ${name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare identifier or keyword
    Ident(String),
    /// Back-quoted identifier
    Quoted(String),
    Str(String),
    Number(Number),
    Named(String),
    Positional(usize),
    Symbol(&'static str),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Quoted(s) => format!("`{s}`"),
            Token::Str(s) => format!("'{s}'"),
            Token::Number(n) => n.to_string(),
            Token::Named(n) => format!("${n}"),
            Token::Positional(n) => format!("${n}"),
            Token::Symbol(s) => (*s).to_string(),
        }
    }
}

/// Split a statement into tokens, respecting quoted strings and
/// back-quoted identifiers.
fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '`' => {
                chars.next();
                let name = read_until(&mut chars, '`', "identifier")?;
                if name.is_empty() {
                    return Err(QueryError::syntax("empty quoted identifier"));
                }
                tokens.push(Token::Quoted(name));
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(read_until(&mut chars, ch, "string")?));
            }
            '$' => {
                chars.next();
                let word = read_word(&mut chars);
                if word.is_empty() {
                    return Err(QueryError::syntax("expected parameter name after '$'"));
                }
                if word.chars().all(|c| c.is_ascii_digit()) {
                    let n: usize = word
                        .parse()
                        .map_err(|_| QueryError::syntax(format!("invalid parameter ${word}")))?;
                    if n == 0 {
                        return Err(QueryError::syntax("positional parameters start at $1"));
                    }
                    tokens.push(Token::Positional(n));
                } else {
                    tokens.push(Token::Named(word));
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                tokens.push(Token::Number(read_number(&mut chars)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                tokens.push(Token::Ident(read_word(&mut chars)));
            }
            _ => {
                chars.next();
                let symbol = match (ch, chars.peek()) {
                    ('=', Some('=')) => {
                        chars.next();
                        "=="
                    }
                    ('!', Some('=')) => {
                        chars.next();
                        "!="
                    }
                    ('<', Some('>')) => {
                        chars.next();
                        "<>"
                    }
                    ('=', _) => "=",
                    ('*', _) => "*",
                    (',', _) => ",",
                    ('.', _) => ".",
                    (';', _) => ";",
                    _ => {
                        return Err(QueryError::syntax(format!("unexpected character '{ch}'")));
                    }
                };
                tokens.push(Token::Symbol(symbol));
            }
        }
    }

    Ok(tokens)
}

/// Read up to the closing `quote`. A doubled quote or a backslash escapes it.
fn read_until(chars: &mut Peekable<Chars<'_>>, quote: char, what: &str) -> Result<String, QueryError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => break,
            },
            Some(c) if c == quote => {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    out.push(quote);
                } else {
                    return Ok(out);
                }
            }
            Some(c) => out.push(c),
            None => break,
        }
    }
    Err(QueryError::syntax(format!("unterminated {what}")))
}

fn read_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    out
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> Result<Number, QueryError> {
    let mut raw = String::new();
    if chars.peek() == Some(&'-') {
        raw.push('-');
        chars.next();
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
            raw.push(c);
            chars.next();
        } else {
            break;
        }
    }

    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Number::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| QueryError::syntax(format!("invalid number '{raw}'")))
}

// ---------------------------------------------------------------------------
// Statement model
// ---------------------------------------------------------------------------

/// A dotted field path such as `address.city`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Look the path up in a document.
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(doc, |current, part| current.get(part))
    }

    /// Name used for the field in projected rows.
    pub fn alias(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

/// What a `SELECT` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Fields(Vec<FieldPath>),
}

/// Comparison operator in a `WHERE` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Like,
    NotLike,
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Named(String),
    Positional(usize),
}

/// One `path op operand` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: FieldPath,
    pub op: Operator,
    pub operand: Operand,
}

/// A parsed `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projection: Projection,
    /// One part (`bucket`) or three (`bucket.scope.collection`).
    pub keyspace: Vec<String>,
    /// Conjunction of conditions.
    pub conditions: Vec<Condition>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Select {
    /// The store keyspace this statement reads.
    pub fn target(&self) -> Keyspace {
        match self.keyspace.as_slice() {
            [bucket, scope, collection] => Keyspace::new(bucket, scope, collection),
            _ => Keyspace::default_collection(self.keyspace.join(".")),
        }
    }

    /// Name that wraps documents in `SELECT *` rows.
    pub fn alias(&self) -> &str {
        self.keyspace.last().map(String::as_str).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

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

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {keyword}")))
        }
    }

    fn unexpected(&self, expectation: &str) -> QueryError {
        match self.peek() {
            Some(token) => QueryError::syntax(format!("{expectation}, found '{}'", token.describe())),
            None => QueryError::syntax(format!("{expectation}, found end of input")),
        }
    }

    fn identifier(&mut self) -> Result<String, QueryError> {
        match self.peek() {
            Some(Token::Quoted(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(Token::Ident(word))
                if !RESERVED.iter().any(|r| word.eq_ignore_ascii_case(r)) =>
            {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn path(&mut self) -> Result<FieldPath, QueryError> {
        let mut parts = vec![self.identifier()?];
        while self.eat_symbol(".") {
            parts.push(self.identifier()?);
        }
        Ok(FieldPath(parts))
    }

    fn count(&mut self, clause: &str) -> Result<usize, QueryError> {
        match self.next() {
            Some(Token::Number(n)) => n
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| QueryError::syntax(format!("{clause} must be a non-negative integer"))),
            _ => {
                self.pos -= 1;
                Err(self.unexpected(&format!("expected number after {clause}")))
            }
        }
    }

    fn operand(&mut self) -> Result<Operand, QueryError> {
        let operand = match self.peek() {
            Some(Token::Str(s)) => Operand::Literal(Value::String(s.clone())),
            Some(Token::Number(n)) => Operand::Literal(Value::Number(n.clone())),
            Some(Token::Named(n)) => Operand::Named(n.clone()),
            Some(Token::Positional(n)) => Operand::Positional(*n),
            Some(t) if t.is_keyword("TRUE") => Operand::Literal(Value::Bool(true)),
            Some(t) if t.is_keyword("FALSE") => Operand::Literal(Value::Bool(false)),
            Some(t) if t.is_keyword("NULL") => Operand::Literal(Value::Null),
            _ => return Err(self.unexpected("expected value or parameter")),
        };
        self.pos += 1;
        Ok(operand)
    }

    fn condition(&mut self) -> Result<Condition, QueryError> {
        let path = self.path()?;
        let op = if self.eat_symbol("=") || self.eat_symbol("==") {
            Operator::Eq
        } else if self.eat_symbol("!=") || self.eat_symbol("<>") {
            Operator::NotEq
        } else if self.eat_keyword("LIKE") {
            Operator::Like
        } else if self.eat_keyword("NOT") {
            self.expect_keyword("LIKE")?;
            Operator::NotLike
        } else {
            return Err(self.unexpected("expected comparison operator"));
        };
        let operand = self.operand()?;
        Ok(Condition { path, op, operand })
    }

    fn select(&mut self) -> Result<Select, QueryError> {
        self.expect_keyword("SELECT")?;

        let projection = if self.eat_symbol("*") {
            Projection::All
        } else {
            let mut fields = vec![self.path()?];
            while self.eat_symbol(",") {
                fields.push(self.path()?);
            }
            Projection::Fields(fields)
        };

        self.expect_keyword("FROM")?;
        let mut keyspace = vec![self.identifier()?];
        while self.eat_symbol(".") {
            keyspace.push(self.identifier()?);
        }
        if keyspace.len() != 1 && keyspace.len() != 3 {
            return Err(QueryError::syntax(
                "keyspace must be `bucket` or `bucket`.`scope`.`collection`",
            ));
        }

        let mut conditions = Vec::new();
        if self.eat_keyword("WHERE") {
            conditions.push(self.condition()?);
            while self.eat_keyword("AND") {
                conditions.push(self.condition()?);
            }
        }

        let mut limit = None;
        let mut offset = None;
        loop {
            if limit.is_none() && self.eat_keyword("LIMIT") {
                limit = Some(self.count("LIMIT")?);
            } else if offset.is_none() && self.eat_keyword("OFFSET") {
                offset = Some(self.count("OFFSET")?);
            } else {
                break;
            }
        }

        self.eat_symbol(";");
        if self.peek().is_some() {
            return Err(self.unexpected("expected end of statement"));
        }

        Ok(Select {
            projection,
            keyspace,
            conditions,
            limit,
            offset,
        })
    }
}

/// Parse a statement.
pub fn parse(input: &str) -> Result<Select, QueryError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax("empty statement"));
    }
    Parser { tokens, pos: 0 }.select()
}

// ---------------------------------------------------------------------------
// Parameters and evaluation
// ---------------------------------------------------------------------------

/// Values bound to `$name` and `$n` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    named: HashMap<String, Value>,
    positional: Vec<Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `$name`. The leading `$` is optional.
    pub fn with_named(mut self, name: &str, value: Value) -> Self {
        self.named
            .insert(name.trim_start_matches('$').to_string(), value);
        self
    }

    /// Append the next positional parameter.
    pub fn with_positional(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Collect parameters from a query request body: `$`-prefixed keys are
    /// named parameters, `args` holds the positional ones.
    pub fn from_request(body: &Map<String, Value>) -> Self {
        let named = body
            .iter()
            .filter_map(|(k, v)| k.strip_prefix('$').map(|name| (name.to_string(), v.clone())))
            .collect();
        let positional = match body.get("args") {
            Some(Value::Array(args)) => args.clone(),
            _ => Vec::new(),
        };
        Self { named, positional }
    }

    fn resolve(&self, operand: &Operand) -> Result<Value, QueryError> {
        match operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Named(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::missing(name)),
            Operand::Positional(n) => self
                .positional
                .get(n - 1)
                .cloned()
                .ok_or_else(|| QueryError::missing(n)),
        }
    }
}

/// A condition with its operand bound and LIKE patterns compiled.
#[derive(Debug)]
enum Matcher {
    Equals(Value),
    NotEquals(Value),
    Like(Regex),
    NotLike(Regex),
    /// LIKE against a non-string pattern never matches.
    Never,
}

#[derive(Debug)]
struct BoundCondition {
    path: FieldPath,
    matcher: Matcher,
}

impl BoundCondition {
    fn matches(&self, doc: &Value) -> bool {
        let Some(field) = self.path.resolve(doc) else {
            return false;
        };
        match &self.matcher {
            Matcher::Equals(v) => values_equal(field, v),
            Matcher::NotEquals(v) => !field.is_null() && !v.is_null() && !values_equal(field, v),
            Matcher::Like(re) => field.as_str().is_some_and(|s| re.is_match(s)),
            Matcher::NotLike(re) => field.as_str().is_some_and(|s| !re.is_match(s)),
            Matcher::Never => false,
        }
    }
}

/// JSON equality where `1` and `1.0` are the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Compile a LIKE pattern: `%` matches any run of characters, `_` exactly
/// one, and `\` escapes the next character.
pub fn like_to_regex(pattern: &str) -> Result<Regex, QueryError> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| QueryError {
        code: EVALUATION_ERROR,
        message: format!("invalid LIKE pattern '{pattern}': {e}"),
    })
}

/// Whether `text` matches the LIKE `pattern`.
pub fn like_match(text: &str, pattern: &str) -> bool {
    like_to_regex(pattern).is_ok_and(|re| re.is_match(text))
}

fn bind(conditions: &[Condition], params: &Parameters) -> Result<Vec<BoundCondition>, QueryError> {
    conditions
        .iter()
        .map(|cond| {
            let value = params.resolve(&cond.operand)?;
            let matcher = match (cond.op, value) {
                (Operator::Eq, v) => Matcher::Equals(v),
                (Operator::NotEq, v) => Matcher::NotEquals(v),
                (Operator::Like, Value::String(p)) => Matcher::Like(like_to_regex(&p)?),
                (Operator::NotLike, Value::String(p)) => Matcher::NotLike(like_to_regex(&p)?),
                (Operator::Like | Operator::NotLike, _) => Matcher::Never,
            };
            Ok(BoundCondition {
                path: cond.path.clone(),
                matcher,
            })
        })
        .collect()
}

fn project(select: &Select, doc: Value) -> Value {
    match &select.projection {
        Projection::All => {
            let mut row = Map::new();
            row.insert(select.alias().to_string(), doc);
            Value::Object(row)
        }
        Projection::Fields(fields) => {
            let row: Map<String, Value> = fields
                .iter()
                .filter_map(|f| f.resolve(&doc).map(|v| (f.alias().to_string(), v.clone())))
                .collect();
            Value::Object(row)
        }
    }
}

/// Evaluate a parsed statement against the store.
pub async fn evaluate(
    store: &DocumentStore,
    select: &Select,
    params: &Parameters,
) -> Result<Vec<Value>, QueryError> {
    let filter = bind(&select.conditions, params)?;
    let target = select.target();

    let documents = store.scan(&target).await.map_err(|e| match e {
        StoreError::BucketNotFound(_) => QueryError {
            code: KEYSPACE_NOT_FOUND,
            message: format!(
                "Keyspace not found in CB datastore: default:{}",
                select.keyspace.join(".")
            ),
        },
        other => QueryError {
            code: EVALUATION_ERROR,
            message: other.to_string(),
        },
    })?;

    let rows = documents
        .into_iter()
        .map(|(_, doc)| doc)
        .filter(|doc| filter.iter().all(|cond| cond.matches(doc)))
        .skip(select.offset.unwrap_or(0))
        .take(select.limit.unwrap_or(usize::MAX))
        .map(|doc| project(select, doc))
        .collect();

    Ok(rows)
}

/// Parse and evaluate a statement in one step.
pub async fn execute(
    store: &DocumentStore,
    statement: &str,
    params: &Parameters,
) -> Result<Vec<Value>, QueryError> {
    let select = parse(statement)?;
    evaluate(store, &select, params).await
}
