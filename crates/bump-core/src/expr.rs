//! Streaming expression model and parser.
//!
//! A streaming expression names a pipeline stage and its parameters:
//!
//! ```text
//! bump(products, batchSize=100, field=popularity, jsonl(file="clicks.jsonl"))
//! ```
//!
//! Parameters are positional values (`products`), named parameters
//! (`batchSize=100`) whose value is either a plain value or a nested
//! expression, and positional nested expressions (`jsonl(...)`). Values are
//! bare tokens or double-quoted strings with `\"` and `\\` escapes.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionParam {
    Value(String),
    Named {
        name: String,
        value: Box<ExpressionParam>,
    },
    Expression(StreamExpression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamExpression {
    pub function: String,
    pub params: Vec<ExpressionParam>,
}

impl StreamExpression {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            params: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.params.push(ExpressionParam::Value(value.into()));
        self
    }

    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(ExpressionParam::Named {
            name: name.into(),
            value: Box::new(ExpressionParam::Value(value.into())),
        });
        self
    }

    pub fn with_expression(mut self, expression: StreamExpression) -> Self {
        self.params.push(ExpressionParam::Expression(expression));
        self
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser::new(text);
        let expression = parser.expression()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("unexpected '{c}' after expression")));
        }
        Ok(expression)
    }

    /// The parameter at `index` if it is a plain value.
    pub fn value_at(&self, index: usize) -> Option<&str> {
        match self.params.get(index) {
            Some(ExpressionParam::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// All positional plain values, in order.
    pub fn positional_values(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|param| match param {
                ExpressionParam::Value(value) => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The value of the first named parameter called `name`.
    pub fn named(&self, name: &str) -> Option<&ExpressionParam> {
        self.params.iter().find_map(|param| match param {
            ExpressionParam::Named { name: n, value } if n == name => Some(value.as_ref()),
            _ => None,
        })
    }

    /// The named parameter `name` if its value is a plain value.
    pub fn named_value(&self, name: &str) -> Option<&str> {
        match self.named(name) {
            Some(ExpressionParam::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Positional nested expressions, in order.
    pub fn expressions(&self) -> Vec<&StreamExpression> {
        self.params
            .iter()
            .filter_map(|param| match param {
                ExpressionParam::Expression(expression) => Some(expression),
                _ => None,
            })
            .collect()
    }
}

impl FromStr for StreamExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StreamExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for ExpressionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write_value(f, value),
            Self::Named { name, value } => write!(f, "{name}={value}"),
            Self::Expression(expression) => write!(f, "{expression}"),
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"' | '='));
    if !needs_quotes {
        return f.write_str(value);
    }
    f.write_str("\"")?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl fmt::Display) -> Error {
        Error::Expression(format!("{message} (at position {})", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn expression(&mut self) -> Result<StreamExpression> {
        self.skip_whitespace();
        let function = self.identifier();
        if function.is_empty() {
            return Err(self.error("expected a function name"));
        }
        self.skip_whitespace();
        if self.bump() != Some('(') {
            return Err(self.error(format!("expected '(' after '{function}'")));
        }

        let mut expression = StreamExpression::new(function);
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(expression);
        }

        loop {
            expression.params.push(self.param()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                Some(c) => return Err(self.error(format!("expected ',' or ')' but found '{c}'"))),
                None => {
                    return Err(self.error(format!(
                        "unterminated expression '{}'",
                        expression.function
                    )))
                }
            }
        }
        Ok(expression)
    }

    fn param(&mut self) -> Result<ExpressionParam> {
        self.skip_whitespace();
        if self.peek() == Some('"') {
            return Ok(ExpressionParam::Value(self.quoted()?));
        }

        let start = self.pos;
        let name = self.identifier();
        if !name.is_empty() {
            self.skip_whitespace();
            match self.peek() {
                Some('(') => {
                    self.pos = start;
                    return Ok(ExpressionParam::Expression(self.expression()?));
                }
                Some('=') => {
                    self.pos += 1;
                    let value = self.named_value()?;
                    return Ok(ExpressionParam::Named {
                        name,
                        value: Box::new(value),
                    });
                }
                _ => {}
            }
        }

        self.pos = start;
        Ok(ExpressionParam::Value(self.bare()?))
    }

    fn named_value(&mut self) -> Result<ExpressionParam> {
        self.skip_whitespace();
        if self.peek() == Some('"') {
            return Ok(ExpressionParam::Value(self.quoted()?));
        }

        let start = self.pos;
        if !self.identifier().is_empty() {
            self.skip_whitespace();
            if self.peek() == Some('(') {
                self.pos = start;
                return Ok(ExpressionParam::Expression(self.expression()?));
            }
        }

        self.pos = start;
        Ok(ExpressionParam::Value(self.bare()?))
    }

    fn bare(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !matches!(c, ',' | '(' | ')' | '"'))
        {
            self.pos += 1;
        }
        let value: String = self.chars[start..self.pos].iter().collect();
        let value = value.trim();
        if value.is_empty() {
            return Err(self.error("expected a value"));
        }
        Ok(value.to_string())
    }

    fn quoted(&mut self) -> Result<String> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}
