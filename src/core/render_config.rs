// src/core/render_config.rs

//! Renderer configuration.
//!
//! A [`RenderConfig`] is a renderer kind plus a property bag. Per-kind
//! behavior (how two bags merge, how a JSON object is decoded, what the
//! default layout is) lives in a [`RendererRegistry`] of plain function
//! pointers, so new kinds are added by registering an entry.
//!
//! [`CascadingRenderConfig`] resolves a renderer's cascade stack into a
//! config snapshot and renders its UI element trees through the shared
//! [`RenderDescriptionCache`].

use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::constants::{DEFAULT_GROUP, INCLUDE_KEYS, MERGE_KEY, TREE_KEY};
use crate::core::cache::RenderDescriptionCache;
use crate::core::cascade::{Cascadable, ListPolicy, PropertyDecl};
use crate::core::diagnostics::DiagnosticKind;
use crate::core::lexer::Span;
use crate::core::parser::{self, ParseError};
use crate::core::printer;
use crate::core::view_arguments::ViewArguments;
use crate::models::{DefinitionValue, ElementNode, ElementTree, FromValue, ItemId, ParsedDefinition, Value};

/// Why a renderer configuration could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderConfigError {
    /// The JSON was not an object.
    #[error("Renderer '{kind}' expects a JSON object, found {found}")]
    NotAnObject {
        /// Renderer kind being decoded.
        kind: String,
        /// JSON type that was found instead.
        found: String,
    },

    /// A property failed the kind's checks.
    #[error("Invalid property '{name}' for renderer '{kind}': {message}")]
    InvalidProperty {
        /// Renderer kind being decoded.
        kind: String,
        /// The rejected property.
        name: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Result alias for renderer configuration decoding.
pub type RenderConfigResult<T> = Result<T, RenderConfigError>;

/// Renderer properties by name.
pub type Properties = BTreeMap<String, Value>;

// --- CONFIG ---

/// A renderer configuration: the renderer kind and its resolved properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderConfig {
    /// Renderer kind, such as `list` or `grid`.
    pub kind: String,
    /// Resolved properties.
    pub properties: Properties,
}

impl RenderConfig {
    /// A config of `kind` with no properties.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            properties: Properties::new(),
        }
    }

    /// Builder-style property insert.
    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// A property by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// A property converted to `T`.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.get(name).cloned().and_then(T::from_value)
    }

    /// Decodes a JSON object without any kind-specific checks.
    pub fn decode(kind: &str, json: &serde_json::Value) -> RenderConfigResult<Self> {
        Ok(Self {
            kind: kind.to_string(),
            properties: decode_generic(kind, json)?,
        })
    }

    /// `{ "kind": .., "properties": {..} }`
    pub fn to_json(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::json!({ "kind": self.kind, "properties": properties })
    }
}

// --- REGISTRY ---

/// Folds `overlay` into `base`. Overlay values are more specific.
pub type MergeFn = fn(&mut Properties, &Properties);
/// Decodes a JSON object into properties for the named kind.
pub type DecodeFn = fn(&str, &serde_json::Value) -> RenderConfigResult<Properties>;
/// Built-in defaults of a kind.
pub type DefaultLayoutFn = fn() -> Properties;

/// The per-kind behavior of a renderer.
#[derive(Debug, Clone, Copy)]
pub struct RendererFns {
    /// How layers combine.
    pub merge: MergeFn,
    /// How stored JSON is read back.
    pub decode: DecodeFn,
    /// Defaults below every layer.
    pub default_layout: DefaultLayoutFn,
}

const GENERIC: RendererFns = RendererFns {
    merge: merge_generic,
    decode: decode_generic,
    default_layout: BTreeMap::new,
};

/// Renderer kind to behavior. Unknown kinds use the generic entry.
#[derive(Debug, Clone)]
pub struct RendererRegistry {
    kinds: HashMap<String, RendererFns>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("list", RendererFns {
            default_layout: list_layout,
            ..GENERIC
        });
        registry.register("grid", RendererFns {
            decode: decode_grid,
            default_layout: grid_layout,
            ..GENERIC
        });
        registry.register("thumbnail", RendererFns {
            decode: decode_grid,
            default_layout: grid_layout,
            ..GENERIC
        });
        registry.register("timeline", RendererFns {
            default_layout: timeline_layout,
            ..GENERIC
        });
        registry.register("calendar", RendererFns {
            default_layout: calendar_layout,
            ..GENERIC
        });
        registry.register("map", RendererFns {
            default_layout: map_layout,
            ..GENERIC
        });
        registry.register("chart", RendererFns {
            default_layout: chart_layout,
            ..GENERIC
        });
        registry.register("generalEditor", RendererFns {
            merge: merge_general_editor,
            decode: decode_general_editor,
            default_layout: general_editor_layout,
        });
        registry
    }
}

impl RendererRegistry {
    /// A registry with no kinds; everything falls back to the generic entry.
    pub fn empty() -> Self {
        Self { kinds: HashMap::new() }
    }

    /// Adds or replaces a kind.
    pub fn register(&mut self, kind: &str, fns: RendererFns) {
        self.kinds.insert(kind.to_string(), fns);
    }

    /// True when `kind` was registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// The functions of `kind`, or the generic ones for unknown kinds.
    pub fn fns(&self, kind: &str) -> RendererFns {
        self.kinds.get(kind).copied().unwrap_or(GENERIC)
    }

    /// A config holding only the kind's defaults.
    pub fn default_config(&self, kind: &str) -> RenderConfig {
        RenderConfig {
            kind: kind.to_string(),
            properties: (self.fns(kind).default_layout)(),
        }
    }

    /// Folds `overlay` into `base` the way `kind` merges.
    pub fn merge(&self, kind: &str, base: &mut Properties, overlay: &Properties) {
        (self.fns(kind).merge)(base, overlay);
    }

    /// Decodes `json` as a config of `kind`, on top of the kind's defaults.
    pub fn decode(&self, kind: &str, json: &serde_json::Value) -> RenderConfigResult<RenderConfig> {
        let fns = self.fns(kind);
        let decoded = (fns.decode)(kind, json)?;
        let mut properties = (fns.default_layout)();
        (fns.merge)(&mut properties, &decoded);
        Ok(RenderConfig {
            kind: kind.to_string(),
            properties,
        })
    }
}

fn merge_generic(base: &mut Properties, overlay: &Properties) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Like the generic merge, except `layout` sections are matched by their
/// `section` key: a more specific section replaces the one it names, new
/// sections are appended.
fn merge_general_editor(base: &mut Properties, overlay: &Properties) {
    for (key, value) in overlay {
        if key != "layout" {
            base.insert(key.clone(), value.clone());
            continue;
        }
        let merged = match (base.get_mut(key), value) {
            (Some(Value::List(existing)), Value::List(incoming)) => {
                merge_sections(existing, incoming);
                true
            }
            _ => false,
        };
        if !merged {
            base.insert(key.clone(), value.clone());
        }
    }
}

fn merge_sections(existing: &mut Vec<Value>, incoming: &[Value]) {
    for section in incoming {
        let name = section_name(section);
        let position = name.and_then(|n| existing.iter().position(|s| section_name(s) == Some(n)));
        match position.and_then(|i| existing.get_mut(i)) {
            Some(slot) => *slot = section.clone(),
            None => existing.push(section.clone()),
        }
    }
}

fn section_name(value: &Value) -> Option<&str> {
    match value {
        Value::Dict(map) => map.get("section").and_then(Value::as_str),
        _ => None,
    }
}

fn decode_generic(kind: &str, json: &serde_json::Value) -> RenderConfigResult<Properties> {
    let serde_json::Value::Object(map) = json else {
        return Err(RenderConfigError::NotAnObject {
            kind: kind.to_string(),
            found: json_type_name(json).to_string(),
        });
    };
    Ok(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
}

fn decode_grid(kind: &str, json: &serde_json::Value) -> RenderConfigResult<Properties> {
    let properties = decode_generic(kind, json)?;
    if let Some(columns) = properties.get("columns") {
        let valid = columns.as_f64().is_some_and(|n| n >= 1.0 && n.fract() == 0.0);
        if !valid {
            return Err(RenderConfigError::InvalidProperty {
                kind: kind.to_string(),
                name: "columns".to_string(),
                message: format!("expected a positive whole number, found {}", columns.to_display_string()),
            });
        }
    }
    Ok(properties)
}

fn decode_general_editor(kind: &str, json: &serde_json::Value) -> RenderConfigResult<Properties> {
    let properties = decode_generic(kind, json)?;
    match properties.get("layout") {
        None | Some(Value::List(_)) => Ok(properties),
        Some(other) => Err(RenderConfigError::InvalidProperty {
            kind: kind.to_string(),
            name: "layout".to_string(),
            message: format!("expected a list of sections, found {}", other.type_name()),
        }),
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn layout(pairs: Vec<(&str, Value)>) -> Properties {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn list_layout() -> Properties {
    layout(vec![("spacing", Value::from(10.0)), ("separatorsEnabled", Value::Bool(true))])
}

fn grid_layout() -> Properties {
    layout(vec![
        ("columns", Value::from(3.0)),
        ("spacing", Value::from(5.0)),
        ("edgeInset", Value::from(5.0)),
    ])
}

fn timeline_layout() -> Properties {
    layout(vec![("timeLevel", Value::from("day")), ("mostRecentFirst", Value::Bool(true))])
}

fn calendar_layout() -> Properties {
    layout(vec![("dateTimeProperty", Value::from("dateCreated"))])
}

fn map_layout() -> Properties {
    layout(vec![
        ("locationKey", Value::from("location")),
        ("addressKey", Value::from("address")),
        ("labelKey", Value::from("name")),
    ])
}

fn chart_layout() -> Properties {
    layout(vec![("chartType", Value::from("bar"))])
}

fn general_editor_layout() -> Properties {
    let mut other = BTreeMap::new();
    other.insert("section".to_string(), Value::from("other"));
    other.insert("fields".to_string(), Value::from("*"));
    layout(vec![("layout", Value::List(vec![Value::Dict(other)]))])
}

// --- CASCADING RENDER CONFIG ---

/// Properties shared by every renderer block.
pub static RENDER_CONFIG_PROPERTIES: &[PropertyDecl] = &[
    PropertyDecl::scalar("spacing"),
    PropertyDecl::scalar("columns"),
    PropertyDecl::scalar("edgeInset"),
    PropertyDecl::scalar("separatorsEnabled"),
    PropertyDecl::scalar("backgroundColor"),
    PropertyDecl::list("layout", ListPolicy::Append),
];

/// An element tree for one render group, with the arguments its expressions
/// should be evaluated against.
#[derive(Debug, Clone)]
pub struct RenderedGroup {
    /// The elements, shared through the render cache.
    pub tree: Arc<ElementTree>,
    /// Arguments with the current item bound.
    pub arguments: ViewArguments,
}

/// Typed view of a renderer's cascade stack.
pub struct CascadingRenderConfig<'a> {
    renderer: String,
    cascade: Cascadable<'a>,
    cache: &'a RenderDescriptionCache,
    registry: &'a RendererRegistry,
}

impl<'a> CascadingRenderConfig<'a> {
    /// Wraps the cascade of the `renderer` kind.
    pub fn new(
        renderer: &str,
        cascade: Cascadable<'a>,
        cache: &'a RenderDescriptionCache,
        registry: &'a RendererRegistry,
    ) -> Self {
        Self {
            renderer: renderer.to_string(),
            cascade,
            cache,
            registry,
        }
    }

    /// The renderer kind.
    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    /// The underlying cascade.
    pub fn cascade(&self) -> &Cascadable<'a> {
        &self.cascade
    }

    /// Unwraps the cascade.
    pub fn into_cascade(self) -> Cascadable<'a> {
        self.cascade
    }

    /// Writes a renderer override.
    pub fn set_state(&mut self, name: &str, value: Value) {
        self.cascade.set_state(name, value);
    }

    /// A declared property, falling back to the kind's default layout.
    pub fn property<T: FromValue>(&self, name: &str) -> Option<T> {
        self.cascade.resolve_as(name).or_else(|| {
            (self.registry.fns(&self.renderer).default_layout)()
                .remove(name)
                .and_then(T::from_value)
        })
    }

    /// Gap between elements.
    pub fn spacing(&self) -> Option<f64> {
        self.property("spacing")
    }

    /// Column count of grid-like kinds.
    pub fn columns(&self) -> Option<i64> {
        self.property("columns")
    }

    /// Padding around the content.
    pub fn edge_inset(&self) -> Option<f64> {
        self.property("edgeInset")
    }

    /// Whether rows are separated.
    pub fn separators_enabled(&self) -> Option<bool> {
        self.property("separatorsEnabled")
    }

    /// Folds the default layout, every layer (least specific first) and the
    /// state layer through the kind's merge function. A layer with
    /// `merge: false` discards what less specific layers contributed.
    pub fn snapshot(&self) -> RenderConfig {
        let fns = self.registry.fns(&self.renderer);
        let mut properties = (fns.default_layout)();

        for layer in self.cascade.stack().layers() {
            if layer.merge_disabled() {
                properties = (fns.default_layout)();
            }
            let evaluated = self.evaluate_properties(layer, self.cascade.arguments());
            (fns.merge)(&mut properties, &evaluated);
        }
        (fns.merge)(&mut properties, self.cascade.state().values());

        RenderConfig {
            kind: self.renderer.clone(),
            properties,
        }
    }

    /// True when some layer describes `group`. The default group exists as
    /// soon as a layer carries element children or a `tree`.
    pub fn has_group(&self, group: &str) -> bool {
        self.find_group(group).is_some()
    }

    /// Free-form options of a group. For the default group these are the
    /// snapshot properties.
    pub fn group_options(&self, group: &str) -> Properties {
        if group == DEFAULT_GROUP {
            return self.snapshot().properties;
        }
        let mut options = Properties::new();
        for layer in self.cascade.stack().layers() {
            if let Some(block) = layer.group(group) {
                options.extend(self.evaluate_properties(block, self.cascade.arguments()));
            }
        }
        options
    }

    /// Renders `group` for `item`. A missing or invalid render description
    /// yields an empty tree.
    pub fn render(&self, item: Option<ItemId>, group: &str) -> RenderedGroup {
        let interpolator = self.cascade.interpolator();
        let arguments = self.cascade.arguments().resolve(item, interpolator);

        let Some(block) = self.find_group(group) else {
            warn!("Renderer '{}' has no render description for group '{}'", self.renderer, group);
            return RenderedGroup {
                tree: Arc::new(ElementTree::default()),
                arguments,
            };
        };

        let tree = match self.build_tree(block) {
            Ok(tree) => tree,
            Err(e) => {
                let context = format!("{}:{}", self.renderer, group);
                match interpolator.diagnostics() {
                    Some(diagnostics) => diagnostics.record(DiagnosticKind::Render, &context, e.to_string()),
                    None => warn!("Failed to render '{}': {}", context, e),
                }
                Arc::new(ElementTree::default())
            }
        };
        RenderedGroup { tree, arguments }
    }

    fn find_group(&self, group: &str) -> Option<&ParsedDefinition> {
        let mut layers = self.cascade.stack().most_specific_first();
        if group == DEFAULT_GROUP {
            return layers.find(|layer| layer.has_render_description()).map(|l| l.as_ref());
        }
        layers.find_map(|layer| layer.group(group))
    }

    fn build_tree(&self, block: &ParsedDefinition) -> Result<Arc<ElementTree>, ParseError> {
        let mut nodes: Vec<ElementNode> = Vec::new();
        for element in block.elements() {
            nodes.push(parser::element_from_definition(element, Span::default())?);
        }
        if let Some(DefinitionValue::List(items)) = block.get(TREE_KEY) {
            let shorthand = parser::normalize_element_array(items).map_err(|message| ParseError {
                message,
                line: 0,
                column: 0,
            })?;
            nodes.extend(shorthand);
        }
        let key = printer::elements_to_cvu_string(&nodes);
        debug!("Rendering {} root element(s) for '{}'", nodes.len(), self.renderer);
        Ok(self.cache.get_or_build(&key, || ElementTree { roots: nodes }))
    }

    fn evaluate_properties(&self, block: &ParsedDefinition, arguments: &ViewArguments) -> Properties {
        block
            .properties
            .iter()
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| {
                let value = self.cascade.interpolator().evaluate_definition(value, arguments);
                (key.clone(), value)
            })
            .collect()
    }
}

fn is_reserved(key: &str) -> bool {
    key == MERGE_KEY || key == TREE_KEY || INCLUDE_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cascade::CascadeStack;
    use crate::core::functions::DefaultHost;
    use crate::core::graph::InMemoryGraph;
    use crate::core::interpolator::Interpolator;
    use crate::core::parser::parse;
    use crate::models::{Domain, Selector};
    use serde_json::json;

    fn stack_of(sources: &[&str]) -> CascadeStack {
        sources
            .iter()
            .fold(CascadeStack::new(), |stack, source| stack.with_layer(parse(source).unwrap()))
    }

    #[test]
    fn test_registry_has_builtin_kinds() {
        let registry = RendererRegistry::default();
        for kind in ["list", "grid", "thumbnail", "generalEditor", "timeline", "calendar", "map", "chart"] {
            assert!(registry.contains(kind), "missing {}", kind);
        }
        assert_eq!(registry.default_config("grid").get_as::<i64>("columns"), Some(3));
        assert!(registry.default_config("unknown").properties.is_empty());
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        let registry = RendererRegistry::default();
        let err = registry.decode("list", &json!([1, 2])).unwrap_err();
        assert_eq!(
            err,
            RenderConfigError::NotAnObject {
                kind: "list".into(),
                found: "array".into()
            }
        );
        assert!(RenderConfig::decode("list", &json!("x")).is_err());
    }

    #[test]
    fn test_decode_applies_defaults_and_kind_checks() {
        let registry = RendererRegistry::default();

        let config = registry.decode("grid", &json!({ "columns": 4 })).unwrap();
        assert_eq!(config.get_as::<i64>("columns"), Some(4));
        assert_eq!(config.get_as::<f64>("spacing"), Some(5.0));

        let err = registry.decode("grid", &json!({ "columns": 0 })).unwrap_err();
        assert!(matches!(err, RenderConfigError::InvalidProperty { ref name, .. } if name == "columns"));
    }

    #[test]
    fn test_general_editor_merges_layout_by_section() {
        // --- Setup ---
        let registry = RendererRegistry::default();
        let overlay = json!({
            "layout": [
                { "section": "other", "fields": "name" },
                { "section": "labels" }
            ]
        });

        // --- Execute ---
        let config = registry.decode("generalEditor", &overlay).unwrap();

        // --- Assert ---
        let Some(Value::List(sections)) = config.get("layout") else {
            panic!("layout should be a list");
        };
        assert_eq!(sections.len(), 2);
        assert_eq!(section_name(&sections[0]), Some("other"));
        assert_eq!(
            sections[0],
            Value::from_json(&json!({ "section": "other", "fields": "name" }))
        );
        assert_eq!(section_name(&sections[1]), Some("labels"));
    }

    #[test]
    fn test_snapshot_folds_defaults_layers_and_state() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&[
            "[renderer = list] { spacing: 4 }",
            "[renderer = list] { separatorsEnabled: false }",
        ]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let mut config = CascadingRenderConfig::new("list", cascade, &cache, &registry);
        config.set_state("title", Value::from("Mine"));

        let snapshot = config.snapshot();

        assert_eq!(snapshot.kind, "list");
        assert_eq!(snapshot.get_as::<f64>("spacing"), Some(4.0));
        assert_eq!(snapshot.get_as::<bool>("separatorsEnabled"), Some(false));
        assert_eq!(snapshot.get_as::<String>("title").as_deref(), Some("Mine"));
        assert_eq!(config.spacing(), Some(4.0));
    }

    #[test]
    fn test_snapshot_merge_false_discards_lower_layers() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&[
            "[renderer = grid] { columns: 5 background: \"red\" }",
            "[renderer = grid] { merge: false spacing: 1 }",
        ]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("grid", cascade, &cache, &registry);

        let snapshot = config.snapshot();

        assert_eq!(snapshot.get_as::<i64>("columns"), Some(3));
        assert_eq!(snapshot.get_as::<f64>("spacing"), Some(1.0));
        assert!(snapshot.get("background").is_none());
        assert!(snapshot.get("merge").is_none());
    }

    #[test]
    fn test_render_default_and_named_groups() {
        // --- Setup ---
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&[
            "[renderer = list] { VStack { Text { text: \"base\" } } labels { padding: 4 Text { } } }",
            "[renderer = list] { HStack { Text { text: \"{.name}\" } } }",
        ]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        // --- Execute ---
        let main = config.render(None, DEFAULT_GROUP);
        let labels = config.render(None, "labels");

        // --- Assert ---
        assert_eq!(main.tree.roots[0].kind, "HStack");
        assert_eq!(labels.tree.roots[0].kind, "Text");
        assert!(config.has_group("labels"));
        assert!(!config.has_group("missing"));
        assert_eq!(config.group_options("labels").get("padding"), Some(&Value::from(4.0)));
    }

    #[test]
    fn test_render_is_served_from_cache() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&["[renderer = list] { VStack { Text { text: \"hi\" } } }"]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        let first = config.render(None, DEFAULT_GROUP);
        let second = config.render(None, DEFAULT_GROUP);

        assert!(Arc::ptr_eq(&first.tree, &second.tree));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_render_tree_shorthand() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&["[renderer = list] { tree: [\"VStack\", { spacing: 2 }, [\"Text\"]] }"]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        let rendered = config.render(None, DEFAULT_GROUP);

        assert_eq!(rendered.tree.node_count(), 2);
        assert_eq!(rendered.tree.roots[0].children[0].kind, "Text");
    }

    #[test]
    fn test_render_keeps_programmatic_elements() {
        // --- Setup ---
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let tree = DefinitionValue::List(vec![
            DefinitionValue::from("VStack"),
            DefinitionValue::List(vec![DefinitionValue::from("Text")]),
        ]);
        let block = ParsedDefinition::new(Selector::domain(Domain::Renderer, Some("list")))
            .with_child(ParsedDefinition::new(Selector::Element("Spacer".into())))
            .with_property(TREE_KEY, tree);
        let stack = CascadeStack::new().with_layer(block);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        // --- Execute ---
        let first = config.render(None, DEFAULT_GROUP);
        let second = config.render(None, DEFAULT_GROUP);

        // --- Assert ---
        assert_eq!(first.tree.node_count(), 3);
        assert_eq!(first.tree.roots[0].kind, "Spacer");
        assert_eq!(first.tree.roots[1].children[0].kind, "Text");
        assert!(Arc::ptr_eq(&first.tree, &second.tree));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_render_rejects_invalid_shorthand_kind() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let block = ParsedDefinition::new(Selector::domain(Domain::Renderer, Some("list")))
            .with_property(TREE_KEY, DefinitionValue::List(vec![DefinitionValue::from("My View")]));
        let stack = CascadeStack::new().with_layer(block);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        let rendered = config.render(None, DEFAULT_GROUP);

        assert!(rendered.tree.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_render_missing_description_is_empty() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&["[renderer = list] { spacing: 3 }"]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        let rendered = config.render(None, DEFAULT_GROUP);

        assert!(rendered.tree.is_empty());
        assert!(!config.has_group(DEFAULT_GROUP));
    }

    #[test]
    fn test_render_binds_current_item() {
        let graph = InMemoryGraph::new();
        let id = graph.create_item("Note", BTreeMap::new());
        let host = DefaultHost::new();
        let cache = RenderDescriptionCache::new();
        let registry = RendererRegistry::default();
        let stack = stack_of(&["[renderer = list] { Text { } }"]);
        let cascade = Cascadable::new(stack, RENDER_CONFIG_PROPERTIES, Interpolator::new(&host, &graph));
        let config = CascadingRenderConfig::new("list", cascade, &cache, &registry);

        let rendered = config.render(Some(id), DEFAULT_GROUP);

        assert_eq!(rendered.arguments.current_item(), Some(id));
        assert!(rendered.arguments.is_resolved());
    }
}
