// src/core/cascade.rs

//! Generic cascade resolution over a stack of parsed definitions.
//!
//! A stack is ordered from least specific (system defaults) to most specific
//! (user customizations). On top of it sits a [`StateLayer`] holding session
//! overrides written through [`Cascadable::set_state`].
//!
//! The walk rule:
//!
//! * scalar properties stop at the first layer that defines them;
//! * list and dictionary properties accumulate over every layer, most specific
//!   first, unless a layer declares `merge: false`, in which case that layer
//!   contributes and the walk stops there.
//!
//! Which rule applies to a property is declared up front by each façade in a
//! table of [`PropertyDecl`]s.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::constants::{INCLUDE_KEYS, MERGE_KEY};
use crate::core::interpolator::Interpolator;
use crate::core::view_arguments::ViewArguments;
use crate::models::{DefinitionValue, FromValue, ParsedDefinition, Value};

// --- DECLARATIONS ---

/// How a list property combines across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPolicy {
    /// Concatenate contributions of every layer.
    Append,
    /// The most specific layer replaces the others.
    Replace,
}

/// How a declared property is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyPolicy {
    /// The first layer that sets it wins.
    Scalar,
    /// A list combined per [`ListPolicy`].
    List(ListPolicy),
    /// A dictionary merged key by key. With `force_array`, every value
    /// is wrapped into a list and lists are concatenated.
    Dict { force_array: bool },
}

/// A property name with its resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDecl {
    /// Property name as written in CVU.
    pub name: &'static str,
    /// How layers combine.
    pub policy: PropertyPolicy,
}

impl PropertyDecl {
    /// Declares a first-wins property.
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            policy: PropertyPolicy::Scalar,
        }
    }

    /// Declares a list property.
    pub const fn list(name: &'static str, policy: ListPolicy) -> Self {
        Self {
            name,
            policy: PropertyPolicy::List(policy),
        }
    }

    /// Declares a dictionary property.
    pub const fn dict(name: &'static str, force_array: bool) -> Self {
        Self {
            name,
            policy: PropertyPolicy::Dict { force_array },
        }
    }
}

/// Looks `name` up in a declaration table.
pub fn find_decl<'d>(table: &'d [PropertyDecl], name: &str) -> Option<&'d PropertyDecl> {
    table.iter().find(|d| d.name == name)
}

/// The outcome of resolving a declared property.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Value of a scalar property, if any layer set it.
    Scalar(Option<Value>),
    /// Combined items of a list property.
    List(Vec<Value>),
    /// Merged entries of a dictionary property.
    Dict(BTreeMap<String, Vec<Value>>),
}

impl Resolved {
    /// The scalar converted to `T`; `None` for other shapes.
    pub fn into_scalar<T: FromValue>(self) -> Option<T> {
        match self {
            Resolved::Scalar(value) => value.and_then(T::from_value),
            _ => None,
        }
    }

    /// The items; a single scalar becomes a one-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Resolved::List(items) => items,
            Resolved::Scalar(Some(Value::List(items))) => items,
            Resolved::Scalar(Some(value)) if !value.is_null() => vec![value],
            _ => Vec::new(),
        }
    }

    /// The entries; empty for other shapes.
    pub fn into_dict(self) -> BTreeMap<String, Vec<Value>> {
        match self {
            Resolved::Dict(map) => map,
            _ => BTreeMap::new(),
        }
    }
}

// --- STACK ---

/// Definitions ordered from least to most specific. Layers are shared and
/// never mutated; a changed definition means a new stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeStack {
    layers: Vec<Arc<ParsedDefinition>>,
}

impl CascadeStack {
    /// An empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a stack from layers ordered least specific first.
    pub fn from_layers(layers: Vec<Arc<ParsedDefinition>>) -> Self {
        Self { layers }
    }

    /// Adds a layer more specific than all current ones.
    pub fn push(&mut self, layer: Arc<ParsedDefinition>) {
        self.layers.push(layer);
    }

    /// Builder form of [`CascadeStack::push`].
    pub fn with_layer(mut self, layer: ParsedDefinition) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    /// Least specific first.
    pub fn layers(&self) -> &[Arc<ParsedDefinition>] {
        &self.layers
    }

    /// Layers in lookup order.
    pub fn most_specific_first(&self) -> impl Iterator<Item = &Arc<ParsedDefinition>> {
        self.layers.iter().rev()
    }

    /// The most specific layer.
    pub fn head(&self) -> Option<&Arc<ParsedDefinition>> {
        self.layers.last()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True when the stack has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

// --- STATE LAYER ---

/// Pristine until the first write; Dirty keeps the original snapshot so that
/// `needs_saving` can tell a real change from a write of the same values.
#[derive(Debug, Clone, PartialEq)]
enum LayerState {
    Pristine(BTreeMap<String, Value>),
    Dirty {
        original: BTreeMap<String, Value>,
        current: BTreeMap<String, Value>,
    },
}

/// The session override layer that sits above every definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLayer {
    state: LayerState,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    values: BTreeMap<String, Value>,
}

impl Default for StateLayer {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl StateLayer {
    /// A pristine layer holding `values`.
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            state: LayerState::Pristine(values),
        }
    }

    /// Current overrides by name.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        match &self.state {
            LayerState::Pristine(values) => values,
            LayerState::Dirty { current, .. } => current,
        }
    }

    /// The override for `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values().get(name)
    }

    fn values_mut(&mut self) -> &mut BTreeMap<String, Value> {
        if let LayerState::Pristine(values) = &self.state {
            let original = values.clone();
            self.state = LayerState::Dirty {
                current: original.clone(),
                original,
            };
        }
        match &mut self.state {
            LayerState::Dirty { current, .. } => current,
            LayerState::Pristine(values) => values,
        }
    }

    /// Sets an override, marking the layer dirty.
    pub fn set(&mut self, name: &str, value: Value) {
        self.values_mut().insert(name.to_string(), value);
    }

    /// Drops an override, marking the layer dirty.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values_mut().remove(name)
    }

    /// True when the current values differ from those last loaded or saved.
    pub fn needs_saving(&self) -> bool {
        match &self.state {
            LayerState::Pristine(_) => false,
            LayerState::Dirty { original, current } => original != current,
        }
    }

    /// Accepts the current values as the new baseline.
    pub fn mark_saved(&mut self) {
        let values = self.values().clone();
        self.state = LayerState::Pristine(values);
    }

    /// Encodes the current values with `bincode`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        let persisted = PersistedState {
            values: self.values().clone(),
        };
        bincode::serde::encode_to_vec(&persisted, bincode::config::standard())
    }

    /// Decodes a pristine layer written by [`StateLayer::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let (persisted, _): (PersistedState, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(Self::new(persisted.values))
    }
}

// --- RESOLVER ---

/// Where a property value was found.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'s> {
    /// A session override.
    State(&'s Value),
    /// A definition value and the layer holding it.
    Layer {
        /// The value as written.
        value: &'s DefinitionValue,
        /// The definition that holds it.
        layer: &'s ParsedDefinition,
    },
}

impl Candidate<'_> {
    /// True when the walk must end after this candidate for merging accessors.
    fn stops_merge(&self) -> bool {
        match self {
            Candidate::State(_) => false,
            Candidate::Layer { layer, .. } => layer.merge_disabled(),
        }
    }
}

/// A cascade stack with its state layer and view arguments, resolving
/// properties through an [`Interpolator`].
pub struct Cascadable<'a> {
    stack: CascadeStack,
    state: StateLayer,
    arguments: ViewArguments,
    declarations: &'static [PropertyDecl],
    interpolator: Interpolator<'a>,
}

impl<'a> Cascadable<'a> {
    /// A resolver over `stack` with an empty state layer and no arguments.
    pub fn new(stack: CascadeStack, declarations: &'static [PropertyDecl], interpolator: Interpolator<'a>) -> Self {
        Self {
            stack,
            state: StateLayer::default(),
            arguments: ViewArguments::new(),
            declarations,
            interpolator,
        }
    }

    /// Replaces the state layer.
    pub fn with_state(mut self, state: StateLayer) -> Self {
        self.state = state;
        self
    }

    /// Replaces the view arguments.
    pub fn with_arguments(mut self, arguments: ViewArguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// The definition layers.
    pub fn stack(&self) -> &CascadeStack {
        &self.stack
    }

    /// The session overrides.
    pub fn state(&self) -> &StateLayer {
        &self.state
    }

    /// Consumes the resolver, keeping its overrides.
    pub fn into_state(self) -> StateLayer {
        self.state
    }

    /// Arguments expressions are evaluated with.
    pub fn arguments(&self) -> &ViewArguments {
        &self.arguments
    }

    /// The evaluator used for expression values.
    pub fn interpolator(&self) -> &Interpolator<'a> {
        &self.interpolator
    }

    /// The declaration table properties resolve against.
    pub fn declarations(&self) -> &'static [PropertyDecl] {
        self.declarations
    }

    /// Every place `name` is defined, state first, then most to least
    /// specific layer.
    pub fn candidates(&self, name: &str) -> Vec<Candidate<'_>> {
        let mut found = Vec::new();
        if let Some(value) = self.state.get(name) {
            found.push(Candidate::State(value));
        }
        for layer in self.stack.most_specific_first() {
            if let Some(value) = layer.get(name) {
                found.push(Candidate::Layer {
                    value,
                    layer: layer.as_ref(),
                });
            }
        }
        found
    }

    fn evaluate(&self, candidate: &Candidate<'_>, extra: Option<&ViewArguments>) -> Value {
        match candidate {
            Candidate::State(value) => (*value).clone(),
            Candidate::Layer { value, .. } => match extra {
                Some(extra) => {
                    let args = self.arguments.merge(extra);
                    self.interpolator.evaluate_definition(value, &args)
                }
                None => self.interpolator.evaluate_definition(value, &self.arguments),
            },
        }
    }

    /// The most specific value of `name`, evaluated. `None` when no layer
    /// defines it.
    pub fn cascade_property(&self, name: &str) -> Option<Value> {
        self.cascade_property_with(name, None)
    }

    /// Like [`Cascadable::cascade_property`], with call-site arguments merged
    /// over the resolver's own.
    pub fn cascade_property_with(&self, name: &str, extra: Option<&ViewArguments>) -> Option<Value> {
        let candidates = self.candidates(name);
        let first = candidates.first()?;
        Some(self.evaluate(first, extra))
    }

    /// [`Cascadable::cascade_property`] converted to `T`.
    pub fn cascade_property_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.cascade_property(name).and_then(T::from_value)
    }

    /// Collects list contributions most specific first. Without `merge` only
    /// the most specific contribution is used.
    pub fn cascade_list(&self, name: &str, merge: bool) -> Vec<Value> {
        self.cascade_list_with(name, merge, None)
    }

    /// Like [`Cascadable::cascade_list`], with call-site arguments merged
    /// over the resolver's own.
    pub fn cascade_list_with(&self, name: &str, merge: bool, extra: Option<&ViewArguments>) -> Vec<Value> {
        let mut items = Vec::new();
        for candidate in self.candidates(name) {
            match self.evaluate(&candidate, extra) {
                Value::List(values) => items.extend(values),
                Value::Null => {}
                value => items.push(value),
            }
            if !merge || candidate.stops_merge() {
                break;
            }
        }
        items
    }

    /// Merges dictionary contributions per key, most specific first. List
    /// values are unioned; single values are unioned too when `force_array`
    /// is set, otherwise the most specific one wins.
    pub fn cascade_dict(&self, name: &str, force_array: bool) -> BTreeMap<String, Vec<Value>> {
        self.cascade_dict_with(name, force_array, None)
    }

    /// Like [`Cascadable::cascade_dict`], with call-site arguments merged
    /// over the resolver's own.
    pub fn cascade_dict_with(
        &self,
        name: &str,
        force_array: bool,
        extra: Option<&ViewArguments>,
    ) -> BTreeMap<String, Vec<Value>> {
        let mut merged: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for candidate in self.candidates(name) {
            let Value::Dict(map) = self.evaluate(&candidate, extra) else {
                log::debug!("Ignoring non-dictionary contribution to '{}'", name);
                continue;
            };
            for (key, value) in map {
                let seen = merged.contains_key(&key);
                let entry = merged.entry(key).or_default();
                match value {
                    Value::List(values) => {
                        for v in values {
                            if !entry.contains(&v) {
                                entry.push(v);
                            }
                        }
                    }
                    single if force_array => {
                        if !entry.contains(&single) {
                            entry.push(single);
                        }
                    }
                    single => {
                        if !seen {
                            entry.push(single);
                        }
                    }
                }
            }
            if candidate.stops_merge() {
                break;
            }
        }
        merged
    }

    /// Resolves a property according to its declaration. Undeclared names
    /// resolve to nothing.
    pub fn resolve(&self, name: &str) -> Resolved {
        let Some(decl) = find_decl(self.declarations, name) else {
            log::warn!("Property '{}' is not declared for this cascade", name);
            return Resolved::Scalar(None);
        };
        match decl.policy {
            PropertyPolicy::Scalar => Resolved::Scalar(self.cascade_property(name)),
            PropertyPolicy::List(ListPolicy::Append) => Resolved::List(self.cascade_list(name, true)),
            PropertyPolicy::List(ListPolicy::Replace) => Resolved::List(self.cascade_list(name, false)),
            PropertyPolicy::Dict { force_array } => Resolved::Dict(self.cascade_dict(name, force_array)),
        }
    }

    /// [`Cascadable::resolve`] for a scalar converted to `T`.
    pub fn resolve_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.resolve(name).into_scalar()
    }

    /// Writes an override into the state layer. Definition layers are never
    /// touched.
    pub fn set_state(&mut self, name: &str, value: Value) {
        log::debug!("Setting state '{}' = {:?}", name, value);
        self.state.set(name, value);
    }

    /// Removes an override and returns it.
    pub fn clear_state(&mut self, name: &str) -> Option<Value> {
        self.state.remove(name)
    }

    /// Every property name defined anywhere in the stack or state, without
    /// the reserved directive keys.
    pub fn property_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.state.values().keys().cloned().collect();
        for layer in self.stack.layers() {
            names.extend(layer.properties.keys().cloned());
        }
        names.remove(MERGE_KEY);
        for key in INCLUDE_KEYS {
            names.remove(key);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::Expression;
    use crate::core::functions::DefaultHost;
    use crate::core::graph::InMemoryGraph;
    use crate::core::parser::parse;
    use crate::models::Selector;

    static TEST_DECLS: &[PropertyDecl] = &[
        PropertyDecl::scalar("title"),
        PropertyDecl::list("buttons", ListPolicy::Append),
        PropertyDecl::list("editButtons", ListPolicy::Replace),
        PropertyDecl::dict("sections", true),
    ];

    fn stack(sources: &[&str]) -> CascadeStack {
        CascadeStack::from_layers(sources.iter().map(|s| Arc::new(parse(s).unwrap())).collect())
    }

    fn with_cascade<R>(sources: &[&str], f: impl FnOnce(&mut Cascadable<'_>) -> R) -> R {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let mut cascade = Cascadable::new(stack(sources), TEST_DECLS, Interpolator::new(&host, &graph));
        f(&mut cascade)
    }

    #[test]
    fn test_scalar_prefers_most_specific() {
        with_cascade(&["[view] { title: \"a\" }", "[view] { title: \"b\" }"], |c| {
            assert_eq!(c.cascade_property("title"), Some(Value::from("b")));
            assert_eq!(c.cascade_property("missing"), None);
        });
    }

    #[test]
    fn test_explicit_false_stops_the_walk() {
        with_cascade(&["[view] { flag: true }", "[view] { flag: false }"], |c| {
            assert_eq!(c.cascade_property_as::<bool>("flag"), Some(false));
        });
    }

    #[test]
    fn test_list_appends_most_specific_first() {
        with_cascade(
            &["[view] { buttons: [a, b] }", "[view] { }", "[view] { buttons: [c] }"],
            |c| {
                assert_eq!(
                    c.resolve("buttons").into_list(),
                    vec![Value::from("c"), Value::from("a"), Value::from("b")]
                );
            },
        );
    }

    #[test]
    fn test_merge_false_layer_stops_accumulation() {
        with_cascade(
            &[
                "[view] { buttons: [a] }",
                "[view] { buttons: [b] merge: false }",
                "[view] { buttons: [c] }",
            ],
            |c| {
                assert_eq!(c.cascade_list("buttons", true), vec![Value::from("c"), Value::from("b")]);
            },
        );
    }

    #[test]
    fn test_replace_policy_behaves_like_scalar() {
        with_cascade(&["[view] { editButtons: [a, b] }", "[view] { editButtons: [c] }"], |c| {
            assert_eq!(c.resolve("editButtons").into_list(), vec![Value::from("c")]);
        });
    }

    #[test]
    fn test_dict_unions_per_key() {
        with_cascade(
            &[
                "[view] { sections: { main: [title, body], meta: owner } }",
                "[view] { sections: { main: [body, tags], extra: x } }",
            ],
            |c| {
                let sections = c.resolve("sections").into_dict();
                assert_eq!(
                    sections["main"],
                    vec![Value::from("body"), Value::from("tags"), Value::from("title")]
                );
                assert_eq!(sections["meta"], vec![Value::from("owner")]);
                assert_eq!(sections["extra"], vec![Value::from("x")]);
            },
        );
    }

    #[test]
    fn test_dict_without_force_array_keeps_most_specific_single() {
        with_cascade(&["[view] { d: { k: a } }", "[view] { d: { k: b } }"], |c| {
            assert_eq!(c.cascade_dict("d", false)["k"], vec![Value::from("b")]);
            assert_eq!(c.cascade_dict("d", true)["k"], vec![Value::from("b"), Value::from("a")]);
        });
    }

    #[test]
    fn test_state_layer_overrides_without_touching_layers() {
        with_cascade(&["[view] { title: \"a\" }"], |c| {
            let before = c.stack().clone();
            c.set_state("title", Value::from("override"));
            assert_eq!(c.cascade_property("title"), Some(Value::from("override")));
            assert_eq!(c.stack(), &before);
            assert!(c.state().needs_saving());
            c.clear_state("title");
            assert_eq!(c.cascade_property("title"), Some(Value::from("a")));
        });
    }

    #[test]
    fn test_expression_evaluated_against_call_site_item() {
        // --- Setup ---
        let graph = InMemoryGraph::new();
        let item = graph.create_item("Note", BTreeMap::from([("title".to_string(), Value::from("hello"))]));
        let host = DefaultHost::new();
        let layer = ParsedDefinition::new(Selector::named("x")).with_property(
            "test",
            DefinitionValue::Expression(Expression::bare(".title").unwrap()),
        );
        let cascade = Cascadable::new(
            CascadeStack::new().with_layer(layer),
            TEST_DECLS,
            Interpolator::new(&host, &graph),
        );

        // --- Execute ---
        let extra = ViewArguments::new().with_item(item);
        let value = cascade.cascade_property_with("test", Some(&extra));

        // --- Assert ---
        assert_eq!(value, Some(Value::from("hello")));
    }

    #[test]
    fn test_list_and_dict_expressions_see_call_site_item() {
        // --- Setup ---
        let graph = InMemoryGraph::new();
        let item = graph.create_item("Note", BTreeMap::from([("title".to_string(), Value::from("hello"))]));
        let host = DefaultHost::new();
        let cascade = Cascadable::new(
            stack(&[
                "[view] { buttons: [\"base\"] sections: { main: [body] } }",
                "[view] { buttons: [{{ .title }}, \"fixed\"] sections: { main: {{ .title }} } }",
            ]),
            TEST_DECLS,
            Interpolator::new(&host, &graph),
        );
        let extra = ViewArguments::new().with_item(item);

        // --- Execute ---
        let buttons = cascade.cascade_list_with("buttons", true, Some(&extra));
        let sections = cascade.cascade_dict_with("sections", true, Some(&extra));
        let without_item = cascade.cascade_list("buttons", true);

        // --- Assert ---
        assert_eq!(
            buttons,
            vec![Value::from("hello"), Value::from("fixed"), Value::from("base")]
        );
        assert_eq!(sections["main"], vec![Value::from("hello"), Value::from("body")]);
        assert_eq!(without_item.first(), Some(&Value::Null));
    }

    #[test]
    fn test_undeclared_property_resolves_to_nothing() {
        with_cascade(&["[view] { other: 1 }"], |c| {
            assert_eq!(c.resolve("other"), Resolved::Scalar(None));
            assert!(c.property_names().contains("other"));
        });
    }

    #[test]
    fn test_state_layer_persistence() {
        let mut state = StateLayer::default();
        assert!(!state.needs_saving());
        state.set("sortAscending", Value::Bool(false));
        state.set("filter", Value::from("x"));

        let restored = StateLayer::from_bytes(&state.to_bytes().unwrap()).unwrap();

        assert_eq!(restored.values(), state.values());
        assert!(!restored.needs_saving());
        state.mark_saved();
        assert!(!state.needs_saving());
    }

    #[test]
    fn test_writing_same_value_does_not_need_saving() {
        let mut state = StateLayer::new(BTreeMap::from([("a".to_string(), Value::Bool(true))]));
        state.set("a", Value::Bool(true));
        assert!(!state.needs_saving());
    }
}
