// src/core/printer.rs

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::core::expression::{Expression, ExpressionMode};
use crate::models::{format_number, DefinitionValue, ElementNode, ParsedDefinition, Selector};

lazy_static! {
    // Keys and selector names that can be written without quotes.
    static ref IDENT_RE: Option<Regex> = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok();
}

const INDENT: &str = "    ";

/// Serializes a definition back to CVU text. Parsing the output yields a
/// definition equal to the input.
pub fn to_cvu_string(definition: &ParsedDefinition) -> String {
    let mut out = String::new();
    write_block(&mut out, definition, 0);
    out
}

/// Serializes several definitions separated by blank lines.
pub fn definitions_to_cvu_string(definitions: &[ParsedDefinition]) -> String {
    definitions
        .iter()
        .map(to_cvu_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serializes element nodes in block form. This is the canonical text of a
/// render description and doubles as its cache key.
pub fn elements_to_cvu_string(nodes: &[ElementNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_element(&mut out, node, 0);
    }
    out
}

/// Serializes a single property value.
pub fn value_to_cvu_string(value: &DefinitionValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn selector_text(selector: &Selector) -> String {
    match selector {
        Selector::Domain {
            domain,
            name: Some(name),
        } => format!("[{} = {}]", domain.as_str(), key_text(name)),
        other => other.to_string(),
    }
}

fn key_text(key: &str) -> String {
    if IDENT_RE.as_ref().is_some_and(|re| re.is_match(key)) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn write_block(out: &mut String, definition: &ParsedDefinition, depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = writeln!(out, "{}{} {{", pad, selector_text(&definition.selector));
    write_properties(out, &definition.properties, depth + 1);
    for child in &definition.children {
        write_block(out, child, depth + 1);
    }
    let _ = writeln!(out, "{}}}", pad);
}

fn write_element(out: &mut String, node: &ElementNode, depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = writeln!(out, "{}{} {{", pad, node.kind);
    write_properties(out, &node.properties, depth + 1);
    for child in &node.children {
        write_element(out, child, depth + 1);
    }
    let _ = writeln!(out, "{}}}", pad);
}

fn write_properties(out: &mut String, properties: &BTreeMap<String, DefinitionValue>, depth: usize) {
    let pad = INDENT.repeat(depth);
    for (key, value) in properties {
        let _ = write!(out, "{}{}: ", pad, key_text(key));
        write_value(out, value);
        out.push('\n');
    }
}

fn write_expression(out: &mut String, expression: &Expression) {
    match expression.mode() {
        ExpressionMode::Interpolated => {
            let _ = write!(out, "\"{}\"", expression.source());
        }
        ExpressionMode::Bare => {
            let _ = write!(out, "{{{{ {} }}}}", expression.source());
        }
    }
}

fn write_value(out: &mut String, value: &DefinitionValue) {
    match value {
        DefinitionValue::Null => out.push_str("nil"),
        DefinitionValue::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        DefinitionValue::Number(n) if n.is_finite() => out.push_str(&format_number(*n)),
        DefinitionValue::Number(_) => out.push_str("nil"),
        DefinitionValue::String(s) => out.push_str(&quote(s)),
        DefinitionValue::Expression(expression) => write_expression(out, expression),
        DefinitionValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        DefinitionValue::Dict(map) if map.is_empty() => out.push_str("{}"),
        DefinitionValue::Dict(map) => {
            out.push_str("{ ");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", key_text(key));
                write_value(out, item);
            }
            out.push_str(" }");
        }
        DefinitionValue::Node(node) => write_inline_node(out, node),
    }
}

fn write_inline_node(out: &mut String, node: &ParsedDefinition) {
    let _ = write!(out, "{} {{", selector_text(&node.selector));
    for (key, item) in &node.properties {
        let _ = write!(out, " {}: ", key_text(key));
        write_value(out, item);
    }
    for child in &node.children {
        out.push(' ');
        write_inline_node(out, child);
    }
    out.push_str(" }");
}
