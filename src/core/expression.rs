// src/core/expression.rs

//! Parsing of the embedded expression language.
//!
//! An expression comes in two flavors:
//!
//! * **interpolated**: a string in which `{...}` segments are evaluated and
//!   spliced into the surrounding text, e.g. `"Hello {.name}"`;
//! * **bare**: a single expression written as `{{ ... }}`.
//!
//! Both are parsed once, when the definition is parsed, so that syntax errors
//! surface as parse errors rather than at evaluation time.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::constants::MAX_NESTING_DEPTH;
use crate::models::Value;

/// A tokenizer or parser failure inside one expression.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (at offset {offset} in '{source_text}')")]
pub struct ExpressionError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into `source_text`.
    pub offset: usize,
    /// The expression text that failed.
    pub source_text: String,
}

/// Result alias for expression parsing.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// How the source text of an [`Expression`] is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionMode {
    /// Literal text with `{...}` expression holes.
    Interpolated,
    /// The whole text is one expression, as inside `{{ ... }}`.
    Bare,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Negate,
}

/// Infix operators, loosest binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||` or `OR`
    Or,
    /// `&&` or `AND`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`, also string and list concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        f.write_str(symbol)
    }
}

/// Expression syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// A number, string, boolean or nil literal.
    Literal(Value),
    /// `.` on its own: the item bound to the current-item argument.
    CurrentItem,
    /// `<target>.name`; a leading `.name` targets the current item.
    Property {
        /// The value whose property is read.
        target: Box<ExprNode>,
        /// Property name.
        name: String,
    },
    /// `name` or `$name`.
    Variable {
        /// Name without the sigil.
        name: String,
        /// Written as `$name`.
        sigil: bool,
    },
    /// `name(args)`, or `receiver.name(args)` with the receiver set.
    Call {
        /// Function name.
        name: String,
        /// Method receiver, passed as the first argument.
        receiver: Option<Box<ExprNode>>,
        /// Explicit arguments.
        args: Vec<ExprNode>,
    },
    /// A prefix operator applied to one operand.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// Its operand.
        operand: Box<ExprNode>,
    },
    /// An infix operator.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<ExprNode>,
        /// Right operand.
        rhs: Box<ExprNode>,
    },
    /// `condition ? then : else`
    Conditional {
        /// Tested for truthiness.
        condition: Box<ExprNode>,
        /// Value when the condition holds.
        then_branch: Box<ExprNode>,
        /// Value otherwise.
        else_branch: Box<ExprNode>,
    },
    /// Text with embedded expressions, evaluated to a string.
    Interpolation(Vec<Segment>),
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text, escapes already resolved.
    Text(String),
    /// A `{...}` hole.
    Expr(ExprNode),
}

/// A parsed expression together with its original source text.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    mode: ExpressionMode,
    ast: Arc<ExprNode>,
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.source == other.source
    }
}

impl Expression {
    /// Parses `source` in the given mode.
    pub fn parse(source: &str, mode: ExpressionMode) -> ExpressionResult<Self> {
        let ast = match mode {
            ExpressionMode::Bare => parse_bare(source)?,
            ExpressionMode::Interpolated => parse_interpolated(source)?,
        };
        Ok(Self {
            source: source.to_string(),
            mode,
            ast: Arc::new(ast),
        })
    }

    /// Parses `source` as the raw body of a quoted string.
    pub fn interpolated(source: &str) -> ExpressionResult<Self> {
        Self::parse(source, ExpressionMode::Interpolated)
    }

    /// Parses `source` as the body of a `{{ ... }}` block.
    pub fn bare(source: &str) -> ExpressionResult<Self> {
        Self::parse(source, ExpressionMode::Bare)
    }

    /// The text as written, without quotes or braces.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// How the source is read.
    pub fn mode(&self) -> ExpressionMode {
        self.mode
    }

    /// True for quoted-string expressions.
    pub fn is_interpolated(&self) -> bool {
        self.mode == ExpressionMode::Interpolated
    }

    /// The parsed tree.
    pub fn ast(&self) -> &ExprNode {
        &self.ast
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ExpressionMode::Interpolated => write!(f, "\"{}\"", self.source),
            ExpressionMode::Bare => write!(f, "{{{{ {} }}}}", self.source),
        }
    }
}

/// Returns true when a raw string body contains an unescaped `{`, which makes
/// it an interpolated expression rather than a plain string.
pub fn has_interpolation(raw: &str) -> bool {
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => return true,
            _ => {}
        }
    }
    false
}

/// Resolves the escape sequences of a raw string body.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_bare(source: &str) -> ExpressionResult<ExprNode> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source,
        depth: 0,
    };
    let node = parser.parse_expression()?;
    match parser.peek() {
        Tok::Eof => Ok(node),
        other => Err(parser.error(format!("Unexpected {} after expression", other.describe()))),
    }
}

fn parse_interpolated(raw: &str) -> ExpressionResult<ExprNode> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, other)) => text.push(other),
                None => text.push('\\'),
            },
            '{' => {
                let start = i + 1;
                let mut end = None;
                let mut quote: Option<char> = None;
                for (j, d) in chars.by_ref() {
                    match d {
                        q if quote == Some(q) => quote = None,
                        '\'' if quote.is_none() => quote = Some('\''),
                        '}' if quote.is_none() => {
                            end = Some(j);
                            break;
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| ExpressionError {
                    message: "Unterminated '{' in interpolated string".to_string(),
                    offset: i,
                    source_text: raw.to_string(),
                })?;
                let body = raw.get(start..end).unwrap_or_default();
                if body.trim().is_empty() {
                    return Err(ExpressionError {
                        message: "Empty '{}' in interpolated string".to_string(),
                        offset: i,
                        source_text: raw.to_string(),
                    });
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Expr(parse_bare(body)?));
            }
            other => text.push(other),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(ExprNode::Interpolation(segments))
}

// --- TOKENIZER ---

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Dot,
    Ident(String),
    Variable(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Variable(name) => format!("'${}'", name),
            Tok::Number(n) => format!("number {}", n),
            Tok::Str(_) => "string".to_string(),
            Tok::Eof => "end of expression".to_string(),
            other => format!("{:?}", other),
        }
    }
}

fn tokenize(source: &str) -> ExpressionResult<Vec<(Tok, usize)>> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut i = 0;

    let err = |message: String, offset: usize| ExpressionError {
        message,
        offset,
        source_text: source.to_string(),
    };

    let collect = |from: usize, to: usize| -> String {
        chars
            .get(from..to)
            .unwrap_or_default()
            .iter()
            .map(|(_, c)| *c)
            .collect()
    };

    while let Some(&(offset, c)) = chars.get(i) {
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (tok, width) = match c {
            '.' => (Tok::Dot, 1),
            '(' => (Tok::LParen, 1),
            ')' => (Tok::RParen, 1),
            ',' => (Tok::Comma, 1),
            '?' => (Tok::Question, 1),
            ':' => (Tok::Colon, 1),
            '+' => (Tok::Plus, 1),
            '-' => (Tok::Minus, 1),
            '*' => (Tok::Star, 1),
            '/' => (Tok::Slash, 1),
            '!' if next == Some('=') => (Tok::NotEq, 2),
            '!' => (Tok::Not, 1),
            '=' if next == Some('=') => (Tok::EqEq, 2),
            '<' if next == Some('=') => (Tok::Le, 2),
            '<' => (Tok::Lt, 1),
            '>' if next == Some('=') => (Tok::Ge, 2),
            '>' => (Tok::Gt, 1),
            '&' if next == Some('&') => (Tok::And, 2),
            '|' if next == Some('|') => (Tok::Or, 2),
            '"' | '\'' => {
                let mut j = i + 1;
                let mut value = String::new();
                loop {
                    match chars.get(j) {
                        None => return Err(err("Unterminated string literal".to_string(), offset)),
                        Some((_, '\\')) => {
                            match chars.get(j + 1).map(|(_, c)| *c) {
                                Some('n') => value.push('\n'),
                                Some('t') => value.push('\t'),
                                Some(other) => value.push(other),
                                None => value.push('\\'),
                            }
                            j += 2;
                        }
                        Some((_, q)) if *q == c => break,
                        Some((_, other)) => {
                            value.push(*other);
                            j += 1;
                        }
                    }
                }
                (Tok::Str(value), j + 1 - i)
            }
            '$' => {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|(_, c)| c.is_alphanumeric() || *c == '_') {
                    j += 1;
                }
                if j == i + 1 {
                    return Err(err("Expected a name after '$'".to_string(), offset));
                }
                let name = collect(i + 1, j);
                (Tok::Variable(name), j - i)
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                while chars.get(j).is_some_and(|(_, c)| c.is_ascii_digit()) {
                    j += 1;
                }
                let has_fraction = chars.get(j).is_some_and(|(_, c)| *c == '.')
                    && chars.get(j + 1).is_some_and(|(_, c)| c.is_ascii_digit());
                if has_fraction {
                    j += 1;
                    while chars.get(j).is_some_and(|(_, c)| c.is_ascii_digit()) {
                        j += 1;
                    }
                }
                let text = collect(i, j);
                let number = text
                    .parse::<f64>()
                    .map_err(|_| err(format!("Invalid number '{}'", text), offset))?;
                (Tok::Number(number), j - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while chars.get(j).is_some_and(|(_, c)| c.is_alphanumeric() || *c == '_') {
                    j += 1;
                }
                let word = collect(i, j);
                let tok = match word.as_str() {
                    "AND" | "and" => Tok::And,
                    "OR" | "or" => Tok::Or,
                    _ => Tok::Ident(word),
                };
                (tok, j - i)
            }
            other => return Err(err(format!("Unexpected character '{}'", other), offset)),
        };

        tokens.push((tok, offset));
        i += width;
    }

    tokens.push((Tok::Eof, source.len()));
    Ok(tokens)
}

// --- PARSER ---

struct ExprParser<'s> {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
    source: &'s str,
    /// Depth of the node under construction.
    depth: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map(|(t, _)| t).unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t).unwrap_or(&Tok::Eof)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Tok, what: &str) -> ExpressionResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {}, found {}", what, self.peek().describe())))
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        let offset = self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.source.len());
        ExpressionError {
            message,
            offset,
            source_text: self.source.to_string(),
        }
    }

    fn descend(&mut self) -> ExpressionResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "Expression nested too deeply (limit {})",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_expression(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        self.descend()?;
        let node = self.parse_conditional()?;
        self.depth = saved;
        Ok(node)
    }

    fn parse_conditional(&mut self) -> ExpressionResult<ExprNode> {
        let condition = self.parse_or()?;
        if !self.eat(&Tok::Question) {
            return Ok(condition);
        }
        let then_branch = self.parse_expression()?;
        self.expect(Tok::Colon, "':' in conditional expression")?;
        let else_branch = self.parse_expression()?;
        Ok(ExprNode::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::Or) {
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_equality()?;
        while self.eat(&Tok::And) {
            self.descend()?;
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinaryOp::Eq,
                Tok::NotEq => BinaryOp::Ne,
                _ => {
                    self.depth = saved;
                    return Ok(lhs);
                }
            };
            self.bump();
            self.descend()?;
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_comparison(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinaryOp::Lt,
                Tok::Le => BinaryOp::Le,
                Tok::Gt => BinaryOp::Gt,
                Tok::Ge => BinaryOp::Ge,
                _ => {
                    self.depth = saved;
                    return Ok(lhs);
                }
            };
            self.bump();
            self.descend()?;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinaryOp::Add,
                Tok::Minus => BinaryOp::Sub,
                _ => {
                    self.depth = saved;
                    return Ok(lhs);
                }
            };
            self.bump();
            self.descend()?;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinaryOp::Mul,
                Tok::Slash => BinaryOp::Div,
                _ => {
                    self.depth = saved;
                    return Ok(lhs);
                }
            };
            self.bump();
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> ExpressionResult<ExprNode> {
        let op = match self.peek() {
            Tok::Not => UnaryOp::Not,
            Tok::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.bump();
        let saved = self.depth;
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth = saved;
        Ok(ExprNode::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> ExpressionResult<ExprNode> {
        let saved = self.depth;
        let mut node = self.parse_primary()?;
        while matches!(self.peek(), Tok::Dot) {
            self.descend()?;
            self.bump();
            let name = match self.bump() {
                Tok::Ident(name) => name,
                other => {
                    self.pos -= 1;
                    return Err(self.error(format!("Expected a property name after '.', found {}", other.describe())));
                }
            };
            node = self.member(node, name)?;
        }
        self.depth = saved;
        Ok(node)
    }

    /// Builds `target.name` or, when followed by `(`, `target.name(args)`.
    fn member(&mut self, target: ExprNode, name: String) -> ExpressionResult<ExprNode> {
        if self.eat(&Tok::LParen) {
            let args = self.parse_arguments()?;
            Ok(ExprNode::Call {
                name,
                receiver: Some(Box::new(target)),
                args,
            })
        } else {
            Ok(ExprNode::Property {
                target: Box::new(target),
                name,
            })
        }
    }

    fn parse_arguments(&mut self) -> ExpressionResult<Vec<ExprNode>> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RParen, "')' after arguments")?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> ExpressionResult<ExprNode> {
        match self.peek().clone() {
            Tok::Dot => {
                self.bump();
                if let Tok::Ident(name) = self.peek().clone() {
                    self.bump();
                    self.member(ExprNode::CurrentItem, name)
                } else {
                    Ok(ExprNode::CurrentItem)
                }
            }
            Tok::Ident(name) => {
                self.bump();
                if matches!(self.peek(), Tok::LParen) {
                    self.bump();
                    let args = self.parse_arguments()?;
                    return Ok(ExprNode::Call {
                        name,
                        receiver: None,
                        args,
                    });
                }
                Ok(match name.as_str() {
                    "true" => ExprNode::Literal(Value::Bool(true)),
                    "false" => ExprNode::Literal(Value::Bool(false)),
                    "nil" | "null" => ExprNode::Literal(Value::Null),
                    _ => ExprNode::Variable { name, sigil: false },
                })
            }
            Tok::Variable(name) => {
                self.bump();
                Ok(ExprNode::Variable { name, sigil: true })
            }
            Tok::Number(n) => {
                self.bump();
                Ok(ExprNode::Literal(Value::Number(n)))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(ExprNode::Literal(Value::String(s)))
            }
            Tok::LParen => {
                self.bump();
                let inner = self.parse_expression()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            other => {
                if matches!(self.peek_at(0), Tok::Eof) {
                    Err(self.error("Unexpected end of expression".to_string()))
                } else {
                    Err(self.error(format!("Unexpected {}", other.describe())))
                }
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: ExprNode, rhs: ExprNode) -> ExprNode {
    ExprNode::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str) -> ExprNode {
        ExprNode::Property {
            target: Box::new(ExprNode::CurrentItem),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_parse_current_item_property() {
        let expr = Expression::bare(".title").unwrap();
        assert_eq!(expr.ast(), &prop("title"));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = Expression::bare("1 + 2 * 3 == 7 AND !false").unwrap();
        let ExprNode::Binary { op, lhs, .. } = expr.ast() else {
            panic!("expected a binary node");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(**lhs, ExprNode::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_parse_method_call_chain() {
        let expr = Expression::bare(".author.name.lowercased()").unwrap();
        let ExprNode::Call { name, receiver, args } = expr.ast() else {
            panic!("expected a call");
        };
        assert_eq!(name, "lowercased");
        assert!(args.is_empty());
        assert!(matches!(receiver.as_deref(), Some(ExprNode::Property { name, .. }) if name == "name"));
    }

    #[test]
    fn test_parse_conditional_and_variables() {
        let expr = Expression::bare("$showAll ? 'all' : count(.labels)").unwrap();
        assert!(matches!(expr.ast(), ExprNode::Conditional { .. }));
    }

    #[test]
    fn test_parse_interpolated_segments() {
        let expr = Expression::interpolated("Hello {.name}, \\{literal\\}").unwrap();
        let ExprNode::Interpolation(segments) = expr.ast() else {
            panic!("expected interpolation");
        };
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("Hello ".into()));
        assert_eq!(segments[1], Segment::Expr(prop("name")));
        assert_eq!(segments[2], Segment::Text(", {literal}".into()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expression::bare("1 +").is_err());
        assert!(Expression::bare("(1").is_err());
        assert!(Expression::bare("a b").is_err());
        assert!(Expression::interpolated("open {.name").is_err());
        assert!(Expression::interpolated("empty {}").is_err());
    }

    #[test]
    fn test_deep_nesting_is_error() {
        let parens = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        let err = Expression::bare(&parens).unwrap_err();
        assert!(err.message.contains("nested too deeply"));

        let chain = format!("1{}", " + 1".repeat(10_000));
        assert!(Expression::bare(&chain).is_err());
        assert!(Expression::bare(&format!("{}true", "!".repeat(10_000))).is_err());
        assert!(Expression::bare(&".a".repeat(5_000)).is_err());
        assert!(Expression::interpolated(&format!("x {{{}1{}}}", "(".repeat(500), ")".repeat(500))).is_err());
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let parens = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(Expression::bare(&parens).is_ok());
        assert!(Expression::bare(&format!("1{}", " + 1".repeat(20))).is_ok());
        assert!(Expression::bare("!!.starred && (.a || (.b && !.c)) ? .x.y.z : 'none'").is_ok());
    }

    #[test]
    fn test_equality_ignores_ast_identity() {
        let a = Expression::bare(".a").unwrap();
        let b = Expression::bare(".a").unwrap();
        let c = Expression::interpolated(".a").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_has_interpolation_and_unescape() {
        assert!(has_interpolation("a {b}"));
        assert!(!has_interpolation("a \\{b\\}"));
        assert_eq!(unescape("a\\\"b\\n\\{"), "a\"b\n{");
    }
}
