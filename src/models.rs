// src/models.rs

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{INCLUDE_KEYS, MERGE_KEY, TREE_KEY};
use crate::core::expression::Expression;

// --- RUNTIME VALUES ---
// What expressions evaluate to and what the state layer stores. These derive
// serde so that state layers can be persisted with bincode.

/// Stable arena index of an item in the item graph.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dynamically typed value produced by evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number; integers are whole `f64`s.
    Number(f64),
    /// Text.
    String(String),
    /// An ordered list.
    List(Vec<Value>),
    /// A string-keyed map.
    Dict(BTreeMap<String, Value>),
    /// A reference to a graph item.
    Item(ItemId),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `!`, `AND`, `OR` and the ternary operator.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            Value::Item(_) => true,
        }
    }

    /// The text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number of a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The flag of a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The id of an item reference.
    pub fn as_item(&self) -> Option<ItemId> {
        match self {
            Value::Item(id) => Some(*id),
            _ => None,
        }
    }

    /// Lowercase type name used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Item(_) => "item",
        }
    }

    /// Text used when a value is spliced into an interpolated string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Dict(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.to_display_string()))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Item(id) => id.to_string(),
        }
    }

    /// Total order used when sorting query results. Nulls sort last and
    /// values of different kinds are ordered by kind.
    pub fn compare_for_sort(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Item(a), Value::Item(b)) => a.cmp(b),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Item(_) => 3,
            Value::List(_) => 4,
            Value::Dict(_) => 5,
            Value::Null => 6,
        }
    }

    /// Converts JSON; objects become dictionaries.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON rendering. Items are rendered as `{"item": <id>}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Dict(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Item(id) => serde_json::json!({ "item": id.0 }),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<ItemId> for Value {
    fn from(id: ItemId) -> Self {
        Value::Item(id)
    }
}

/// Integral numbers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Negative zero prints as "0".
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Typed extraction of an evaluated value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(format_number(n)),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => integral(n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "only whole numbers inside the i64 range reach the cast"
)]
fn integral(n: f64) -> Option<i64> {
    let in_range = n >= i64::MIN as f64 && n < i64::MAX as f64;
    (in_range && n.fract() == 0.0).then(|| n as i64)
}

impl FromValue for ItemId {
    fn from_value(value: Value) -> Option<Self> {
        value.as_item()
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(items),
            Value::Null => None,
            other => Some(vec![other]),
        }
    }
}

// --- DEFINITION MODEL ---
// The parsed form of CVU text. Definitions are immutable once parsed and are
// shared between cascade stacks through `Arc`.

/// A property value inside a definition, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionValue {
    /// `null`
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// A numeric literal.
    Number(f64),
    /// A plain string literal.
    String(String),
    /// A `{..}` expression or an interpolated string.
    Expression(Expression),
    /// A `[..]` list.
    List(Vec<DefinitionValue>),
    /// A `{ key: value }` dictionary.
    Dict(BTreeMap<String, DefinitionValue>),
    /// An inline action or element block such as `addItem { template: {..} }`.
    Node(Box<ParsedDefinition>),
}

impl DefinitionValue {
    /// The text of a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DefinitionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The flag of a boolean literal.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DefinitionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for values that need evaluation.
    pub fn is_expression(&self) -> bool {
        matches!(self, DefinitionValue::Expression(_))
    }

    /// Converts a value that contains no expressions. Returns `None` as soon as
    /// an expression is found anywhere inside.
    pub fn to_literal(&self) -> Option<Value> {
        match self {
            DefinitionValue::Null => Some(Value::Null),
            DefinitionValue::Bool(b) => Some(Value::Bool(*b)),
            DefinitionValue::Number(n) => Some(Value::Number(*n)),
            DefinitionValue::String(s) => Some(Value::String(s.clone())),
            DefinitionValue::Expression(_) => None,
            DefinitionValue::List(items) => items
                .iter()
                .map(DefinitionValue::to_literal)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            DefinitionValue::Dict(map) => map
                .iter()
                .map(|(k, v)| v.to_literal().map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Value::Dict),
            DefinitionValue::Node(node) => {
                let mut dict = BTreeMap::new();
                dict.insert(node.selector.node_key().to_string(), Value::String(node.selector.to_string()));
                for (k, v) in &node.properties {
                    dict.insert(k.clone(), v.to_literal()?);
                }
                Some(Value::Dict(dict))
            }
        }
    }
}

impl From<&str> for DefinitionValue {
    fn from(s: &str) -> Self {
        DefinitionValue::String(s.to_string())
    }
}

/// The domains that may appear in a bracketed selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    /// `[view]`
    View,
    /// `[datasource]`
    Datasource,
    /// `[renderer]`
    Renderer,
    /// `[session]`
    Session,
    /// `[sessions]`
    Sessions,
    /// `[style]`
    Style,
    /// `[color]`
    Color,
    /// `[language]`
    Language,
}

impl Domain {
    /// Parses a domain keyword.
    pub fn parse(name: &str) -> Option<Domain> {
        match name {
            "view" => Some(Domain::View),
            "datasource" => Some(Domain::Datasource),
            "renderer" => Some(Domain::Renderer),
            "session" => Some(Domain::Session),
            "sessions" => Some(Domain::Sessions),
            "style" => Some(Domain::Style),
            "color" => Some(Domain::Color),
            "language" => Some(Domain::Language),
            _ => None,
        }
    }

    /// The keyword as written in a selector.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::View => "view",
            Domain::Datasource => "datasource",
            Domain::Renderer => "renderer",
            Domain::Session => "session",
            Domain::Sessions => "sessions",
            Domain::Style => "style",
            Domain::Color => "color",
            Domain::Language => "language",
        }
    }
}

/// What a definition block applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `Person` or `Person[]`.
    Type { name: String, list: bool },
    /// `.allNotes`.
    Named(String),
    /// `[view]`, `[renderer = list]`, `[datasource = pod]`.
    Domain { domain: Domain, name: Option<String> },
    /// A UI element block, e.g. `VStack { .. }`.
    Element(String),
    /// A named render group inside a renderer, e.g. `labels { .. }`.
    Group(String),
    /// An inline action block used as a value.
    Action(String),
}

impl Selector {
    /// Selector for an item type, or `Type[]` with `list` set.
    pub fn type_selector(name: &str, list: bool) -> Self {
        Selector::Type {
            name: name.to_string(),
            list,
        }
    }

    /// Selector for a `"named"` definition.
    pub fn named(name: &str) -> Self {
        Selector::Named(name.to_string())
    }

    /// Selector for `[domain]` or `[domain = name]`.
    pub fn domain(domain: Domain, name: Option<&str>) -> Self {
        Selector::Domain {
            domain,
            name: name.map(str::to_string),
        }
    }

    /// The bare name carried by the selector, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Selector::Type { name, .. } => Some(name),
            Selector::Named(name)
            | Selector::Element(name)
            | Selector::Group(name)
            | Selector::Action(name) => Some(name),
            Selector::Domain { name, .. } => name.as_deref(),
        }
    }

    /// Dictionary key used when an inline node is turned into a value.
    pub fn node_key(&self) -> &'static str {
        match self {
            Selector::Element(_) => "element",
            _ => "action",
        }
    }

    /// True for selectors that may appear at the top of a file.
    pub fn is_top_level(&self) -> bool {
        matches!(
            self,
            Selector::Type { .. } | Selector::Named(_) | Selector::Domain { .. }
        )
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Type { name, list: true } => write!(f, "{}[]", name),
            Selector::Type { name, list: false } => write!(f, "{}", name),
            Selector::Named(name) => write!(f, ".{}", name),
            Selector::Domain { domain, name: None } => write!(f, "[{}]", domain.as_str()),
            Selector::Domain {
                domain,
                name: Some(name),
            } => write!(f, "[{} = {}]", domain.as_str(), name),
            Selector::Element(name) | Selector::Group(name) | Selector::Action(name) => {
                write!(f, "{}", name)
            }
        }
    }
}

/// A parsed definition block: a selector, its properties and nested blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDefinition {
    /// What the block applies to.
    pub selector: Selector,
    /// Property values by name.
    pub properties: BTreeMap<String, DefinitionValue>,
    /// Nested blocks in source order.
    pub children: Vec<ParsedDefinition>,
}

impl ParsedDefinition {
    /// An empty block for `selector`.
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style property insert.
    pub fn with_property(mut self, name: &str, value: DefinitionValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: ParsedDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// A property by name.
    pub fn get(&self, name: &str) -> Option<&DefinitionValue> {
        self.properties.get(name)
    }

    /// Finds a nested `[domain]` or `[domain = name]` block. With `name` set
    /// to `None` only the unnamed form matches.
    pub fn sub_definition(&self, domain: Domain, name: Option<&str>) -> Option<&ParsedDefinition> {
        self.children.iter().find(|child| match &child.selector {
            Selector::Domain { domain: d, name: n } => *d == domain && n.as_deref() == name,
            _ => false,
        })
    }

    /// All nested blocks of the given domain, regardless of their name.
    pub fn sub_definitions(&self, domain: Domain) -> impl Iterator<Item = &ParsedDefinition> {
        self.children.iter().filter(move |child| {
            matches!(&child.selector, Selector::Domain { domain: d, .. } if *d == domain)
        })
    }

    /// Element children, in order.
    pub fn elements(&self) -> impl Iterator<Item = &ParsedDefinition> {
        self.children
            .iter()
            .filter(|child| matches!(child.selector, Selector::Element(_)))
    }

    /// The render group block named `name`.
    pub fn group(&self, name: &str) -> Option<&ParsedDefinition> {
        self.children
            .iter()
            .find(|child| matches!(&child.selector, Selector::Group(g) if g == name))
    }

    /// True when this block carries a UI description, either as element
    /// children or as an array-shorthand `tree` property.
    pub fn has_render_description(&self) -> bool {
        self.elements().next().is_some() || self.properties.contains_key(TREE_KEY)
    }

    /// Names listed under `include`/`inherit`, in declaration order.
    pub fn includes(&self) -> Vec<String> {
        let mut names = Vec::new();
        for key in INCLUDE_KEYS {
            match self.properties.get(key) {
                Some(DefinitionValue::String(name)) => names.push(name.clone()),
                Some(DefinitionValue::List(items)) => {
                    names.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)))
                }
                _ => {}
            }
        }
        names
    }

    /// A layer with `merge: false` stops list and dictionary accumulation.
    pub fn merge_disabled(&self) -> bool {
        matches!(self.properties.get(MERGE_KEY), Some(DefinitionValue::Bool(false)))
    }
}

// --- RENDER DESCRIPTIONS ---

/// One node of a UI element tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    /// Element kind, such as `VStack`.
    pub kind: String,
    /// Element properties, unevaluated.
    pub properties: BTreeMap<String, DefinitionValue>,
    /// Nested elements.
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    /// An element with no properties or children.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }
}

/// A parsed render description: the element roots of one render group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementTree {
    /// Top-level elements.
    pub roots: Vec<ElementNode>,
}

impl ElementTree {
    /// True when there are no roots.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes in the whole tree.
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[ElementNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }
}

/// An action reference resolved from a view property such as `actionButton`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    /// Action name, such as `addItem`.
    pub name: String,
    /// Evaluated action arguments.
    pub arguments: BTreeMap<String, Value>,
}

impl ActionDescriptor {
    /// Accepts either a bare action name or a dictionary produced by an inline
    /// action block (`{"action": name, ..arguments}`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self {
                name: name.clone(),
                arguments: BTreeMap::new(),
            }),
            Value::Dict(map) => {
                let name = map.get("action")?.as_str()?.to_string();
                let arguments = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != "action")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some(Self { name, arguments })
            }
            _ => None,
        }
    }

    /// `{ "name": .., "arguments": {..} }`
    pub fn to_json(&self) -> serde_json::Value {
        let arguments: serde_json::Map<String, serde_json::Value> = self
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::json!({ "name": self.name, "arguments": arguments })
    }
}

// --- ITEM GRAPH ---

/// A typed record in the item graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    /// Graph-assigned id.
    pub id: ItemId,
    /// Type name, such as `Note`.
    pub item_type: String,
    /// Stable unique id within the type.
    pub uid: String,
    /// Property values by name.
    pub properties: BTreeMap<String, Value>,
}

impl Item {
    /// A property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A typed, directed relationship between two items.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Relationship name.
    pub edge_type: String,
    /// Item the edge starts at.
    pub source: ItemId,
    /// Item the edge points to.
    pub target: ItemId,
}
