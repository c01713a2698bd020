// src/core/parser.rs

//! Recursive-descent parser for CVU definition text.
//!
//! The grammar is a sequence of top-level blocks:
//!
//! ```text
//! Person[] {                      // type selector, list form
//!     title: "All {.name}"        // interpolated string
//!     showLabels: {{ $mode == 'edit' }}
//!     [datasource = pod] { query: "Person" }
//!     [renderer = list] {
//!         VStack { Text { text: "{.name}" } }
//!         labels { Text { text: "label" } }
//!     }
//! }
//! .allNotes { ... }               // named selector
//! [view] { ... }                  // domain selector
//! ```
//!
//! `parse_definitions` recovers from errors at block granularity so that one
//! malformed block does not hide the others.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::constants::{MAX_NESTING_DEPTH, TREE_KEY};
use crate::core::expression::{self, Expression};
use crate::core::lexer::{Lexer, Span, Token, TokenKind};
use crate::models::{DefinitionValue, Domain, ElementNode, ElementTree, ParsedDefinition, Selector};

/// A parse failure with its 1-based position.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Line of the offending token.
    pub line: usize,
    /// Column of the offending token.
    pub column: usize,
}

impl ParseError {
    fn at(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

/// Result alias for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses text that must contain exactly one top-level definition.
pub fn parse(source: &str) -> ParseResult<ParsedDefinition> {
    let mut parser = Parser::new(source);
    let eof = parser.peek_span();
    if parser.at_eof() {
        return Err(ParseError::at(eof, "Expected a definition, found end of input"));
    }
    let definition = parser.parse_definition()?;
    if !parser.at_eof() {
        return Err(ParseError::at(
            parser.peek_span(),
            "Expected a single definition but found more input",
        ));
    }
    Ok(definition)
}

/// Parses every top-level definition in `source`, collecting one result per
/// block. After an error the parser skips to the end of the offending block.
pub fn parse_definitions(source: &str) -> Vec<ParseResult<ParsedDefinition>> {
    let mut parser = Parser::new(source);
    let mut results = Vec::new();

    while !parser.at_eof() {
        let start = parser.pos;
        match parser.parse_definition() {
            Ok(definition) => results.push(Ok(definition)),
            Err(e) => {
                log::debug!("Recovering after parse error: {}", e);
                results.push(Err(e));
                parser.recover_from(start);
            }
        }
    }

    results
}

/// Parses a render description: a sequence of element blocks.
pub fn parse_element_tree(source: &str) -> ParseResult<ElementTree> {
    let mut parser = Parser::new(source);
    let mut roots = Vec::new();

    while !parser.at_eof() {
        let span = parser.peek_span();
        let name = match parser.bump().kind {
            TokenKind::Ident(name) if is_element_name(&name) => name,
            TokenKind::Error(msg) => return Err(ParseError::at(span, msg)),
            other => {
                return Err(ParseError::at(
                    span,
                    format!("Expected an element name, found {}", other.describe()),
                ));
            }
        };
        parser.expect(TokenKind::LBrace, "'{' after element name")?;
        let block = parser.parse_block(Selector::Element(name), span)?;
        roots.push(element_from_definition(&block, span)?);
    }

    Ok(ElementTree { roots })
}

/// Converts an element block into an element node, expanding any `tree`
/// shorthand property into trailing children.
pub fn element_from_definition(definition: &ParsedDefinition, span: Span) -> ParseResult<ElementNode> {
    let Selector::Element(kind) = &definition.selector else {
        return Err(ParseError::at(
            span,
            format!("'{}' is not an element", definition.selector),
        ));
    };
    let mut node = ElementNode::new(kind);
    for (key, value) in &definition.properties {
        if key == TREE_KEY {
            continue;
        }
        node.properties.insert(key.clone(), value.clone());
    }
    for child in &definition.children {
        node.children.push(element_from_definition(child, span)?);
    }
    if let Some(DefinitionValue::List(items)) = definition.get(TREE_KEY) {
        node.children
            .extend(normalize_element_array(items).map_err(|msg| ParseError::at(span, msg))?);
    }
    Ok(node)
}

/// Normalizes the array shorthand for UI trees:
/// `["VStack", {props}, ["Text", {..}]]` where each string starts an element,
/// an optional dictionary holds its properties and an optional array holds its
/// children.
pub fn normalize_element_array(items: &[DefinitionValue]) -> Result<Vec<ElementNode>, String> {
    let mut nodes = Vec::new();
    let mut iter = items.iter().peekable();

    while let Some(item) = iter.next() {
        let kind = match item {
            DefinitionValue::String(kind) if is_element_kind(kind) => kind,
            DefinitionValue::String(kind) => {
                return Err(format!("'{}' is not a valid element name in a UI tree array", kind));
            }
            DefinitionValue::Dict(_) | DefinitionValue::List(_) => {
                return Err(
                    "Element properties or children must follow an element name in a UI tree array"
                        .to_string(),
                );
            }
            _ => {
                return Err(
                    "Invalid UI tree array entry: expected a string, dictionary or array".to_string(),
                );
            }
        };

        let mut node = ElementNode::new(kind);
        if let Some(DefinitionValue::Dict(props)) = iter.peek() {
            node.properties = props.clone();
            iter.next();
        }
        if let Some(DefinitionValue::List(children)) = iter.peek() {
            node.children = normalize_element_array(children)?;
            iter.next();
        }
        nodes.push(node);
    }

    Ok(nodes)
}

fn is_element_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// An element name that would also lex as a single identifier.
fn is_element_kind(name: &str) -> bool {
    is_element_name(name) && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open blocks and values around the current position.
    depth: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper, failing past `MAX_NESTING_DEPTH`.
    fn nested<T>(&mut self, span: Span, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::at(
                span,
                format!("Nesting too deep (limit {})", MAX_NESTING_DEPTH),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_next(&self) -> &TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            span: self.peek_span(),
        });
        if self.pos < self.tokens.len() && !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> ParseResult<()> {
        let span = self.peek_span();
        if *self.peek() == expected {
            self.bump();
            return Ok(());
        }
        Err(self.unexpected(span, what))
    }

    fn unexpected(&self, span: Span, what: &str) -> ParseError {
        match self.peek() {
            TokenKind::Error(msg) => ParseError::at(span, msg.clone()),
            other => ParseError::at(span, format!("Expected {}, found {}", what, other.describe())),
        }
    }

    /// Skips from `start` to just past the first balanced `{ ... }` block.
    fn recover_from(&mut self, start: usize) {
        self.pos = start;
        let mut depth = 0usize;
        let mut entered = false;

        while !self.at_eof() {
            match self.bump().kind {
                TokenKind::LBrace => {
                    depth += 1;
                    entered = true;
                }
                TokenKind::RBrace if entered => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_definition(&mut self) -> ParseResult<ParsedDefinition> {
        let span = self.peek_span();
        let selector = self.parse_selector()?;
        self.expect(TokenKind::LBrace, "'{' after selector")?;
        self.parse_block(selector, span)
    }

    fn parse_selector(&mut self) -> ParseResult<Selector> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Ident(name) if is_element_name(&name) => {
                self.bump();
                let list = if matches!(self.peek(), TokenKind::LBracket)
                    && matches!(self.peek_next(), TokenKind::RBracket)
                {
                    self.bump();
                    self.bump();
                    true
                } else {
                    false
                };
                Ok(Selector::Type { name, list })
            }
            TokenKind::Dot => {
                self.bump();
                let name_span = self.peek_span();
                match self.bump().kind {
                    TokenKind::Ident(name) => Ok(Selector::Named(name)),
                    other => Err(ParseError::at(
                        name_span,
                        format!("Expected a name after '.', found {}", other.describe()),
                    )),
                }
            }
            TokenKind::LBracket => self.parse_domain_selector(),
            _ => Err(self.unexpected(span, "a type name, '.name' or '[domain]' selector")),
        }
    }

    fn parse_domain_selector(&mut self) -> ParseResult<Selector> {
        self.expect(TokenKind::LBracket, "'['")?;
        let span = self.peek_span();
        let domain_name = match self.bump().kind {
            TokenKind::Ident(name) => name,
            other => {
                return Err(ParseError::at(
                    span,
                    format!("Expected a domain name, found {}", other.describe()),
                ));
            }
        };
        let domain = Domain::parse(&domain_name)
            .ok_or_else(|| ParseError::at(span, format!("Unknown selector domain '{}'", domain_name)))?;

        let mut name = None;
        if matches!(self.peek(), TokenKind::Equals) {
            self.bump();
            let name_span = self.peek_span();
            name = Some(match self.bump().kind {
                TokenKind::Ident(n) => n,
                TokenKind::Str(raw) => expression::unescape(&raw),
                other => {
                    return Err(ParseError::at(
                        name_span,
                        format!("Expected a name after '=', found {}", other.describe()),
                    ));
                }
            });
        }
        self.expect(TokenKind::RBracket, "']' to close the selector")?;
        Ok(Selector::Domain { domain, name })
    }

    /// Parses the body of a block whose opening brace was already consumed.
    fn parse_block(&mut self, selector: Selector, open: Span) -> ParseResult<ParsedDefinition> {
        self.nested(open, |parser| parser.parse_block_body(selector, open))
    }

    fn parse_block_body(&mut self, selector: Selector, open: Span) -> ParseResult<ParsedDefinition> {
        let mut definition = ParsedDefinition::new(selector);

        loop {
            let span = self.peek_span();
            match self.peek().clone() {
                TokenKind::RBrace => {
                    self.bump();
                    return Ok(definition);
                }
                TokenKind::Eof => {
                    return Err(ParseError::at(
                        open,
                        format!("Unterminated block for '{}': missing '}}'", definition.selector),
                    ));
                }
                TokenKind::Comma => {
                    self.bump();
                }
                TokenKind::LBracket => {
                    let selector = self.parse_domain_selector()?;
                    self.expect(TokenKind::LBrace, "'{' after selector")?;
                    let child = self.parse_block(selector, span)?;
                    definition.children.push(child);
                }
                TokenKind::Ident(name) => {
                    self.bump();
                    match self.peek() {
                        TokenKind::Colon => {
                            self.bump();
                            let value = self.parse_value()?;
                            self.insert_property(&mut definition, name, value, span)?;
                        }
                        TokenKind::LBrace => {
                            self.bump();
                            let selector = if is_element_name(&name) {
                                Selector::Element(name)
                            } else {
                                Selector::Group(name)
                            };
                            let child = self.parse_block(selector, span)?;
                            definition.children.push(child);
                        }
                        _ => return Err(self.unexpected(self.peek_span(), &format!("':' or '{{' after '{}'", name))),
                    }
                }
                TokenKind::Str(raw) => {
                    self.bump();
                    self.expect(TokenKind::Colon, "':' after quoted key")?;
                    let value = self.parse_value()?;
                    self.insert_property(&mut definition, expression::unescape(&raw), value, span)?;
                }
                _ => return Err(self.unexpected(span, "a property, nested block or '}'")),
            }
        }
    }

    fn insert_property(
        &self,
        definition: &mut ParsedDefinition,
        name: String,
        value: DefinitionValue,
        span: Span,
    ) -> ParseResult<()> {
        if name == TREE_KEY {
            if let DefinitionValue::List(items) = &value {
                normalize_element_array(items).map_err(|msg| ParseError::at(span, msg))?;
            }
        }
        if definition.properties.contains_key(&name) {
            return Err(ParseError::at(span, format!("Duplicate property '{}'", name)));
        }
        definition.properties.insert(name, value);
        Ok(())
    }

    fn parse_value(&mut self) -> ParseResult<DefinitionValue> {
        let span = self.peek_span();
        self.nested(span, |parser| parser.parse_value_body(span))
    }

    fn parse_value_body(&mut self, span: Span) -> ParseResult<DefinitionValue> {
        match self.peek().clone() {
            TokenKind::Str(raw) => {
                self.bump();
                string_value(&raw, span)
            }
            TokenKind::Expr(body) => {
                self.bump();
                Expression::bare(&body)
                    .map(DefinitionValue::Expression)
                    .map_err(|e| ParseError::at(span, format!("Invalid expression: {}", e)))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(DefinitionValue::Number(n))
            }
            TokenKind::Color(c) => {
                self.bump();
                Ok(DefinitionValue::String(c))
            }
            TokenKind::Ident(word) => {
                self.bump();
                if matches!(self.peek(), TokenKind::LBrace) {
                    self.bump();
                    let selector = if is_element_name(&word) {
                        Selector::Element(word)
                    } else {
                        Selector::Action(word)
                    };
                    let node = self.parse_block(selector, span)?;
                    return Ok(DefinitionValue::Node(Box::new(node)));
                }
                Ok(match word.as_str() {
                    "true" => DefinitionValue::Bool(true),
                    "false" => DefinitionValue::Bool(false),
                    "nil" | "null" => DefinitionValue::Null,
                    _ => DefinitionValue::String(word),
                })
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        TokenKind::RBracket => {
                            self.bump();
                            return Ok(DefinitionValue::List(items));
                        }
                        TokenKind::Comma => {
                            self.bump();
                        }
                        TokenKind::Eof => {
                            return Err(ParseError::at(span, "Unterminated list: missing ']'"));
                        }
                        _ => items.push(self.parse_value()?),
                    }
                }
            }
            TokenKind::LBrace => {
                self.bump();
                let mut map = BTreeMap::new();
                loop {
                    let key_span = self.peek_span();
                    let key = match self.peek().clone() {
                        TokenKind::RBrace => {
                            self.bump();
                            return Ok(DefinitionValue::Dict(map));
                        }
                        TokenKind::Comma => {
                            self.bump();
                            continue;
                        }
                        TokenKind::Eof => {
                            return Err(ParseError::at(span, "Unterminated dictionary: missing '}'"));
                        }
                        TokenKind::Ident(key) => key,
                        TokenKind::Str(raw) => expression::unescape(&raw),
                        _ => return Err(self.unexpected(key_span, "a dictionary key")),
                    };
                    self.bump();
                    self.expect(TokenKind::Colon, "':' after dictionary key")?;
                    let value = self.parse_value()?;
                    map.insert(key, value);
                }
            }
            _ => Err(self.unexpected(span, "a value")),
        }
    }
}

/// A quoted string with an unescaped `{` is an interpolated expression,
/// anything else is a plain string with escapes resolved.
fn string_value(raw: &str, span: Span) -> ParseResult<DefinitionValue> {
    if expression::has_interpolation(raw) {
        Expression::interpolated(raw)
            .map(DefinitionValue::Expression)
            .map_err(|e| ParseError::at(span, format!("Invalid interpolated string: {}", e)))
    } else {
        Ok(DefinitionValue::String(expression::unescape(raw)))
    }
}
