// src/core/view_arguments.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::constants::CURRENT_ITEM_KEY;
use crate::core::interpolator::Interpolator;
use crate::models::{DefinitionValue, ItemId, Value};

/// An argument is either an already evaluated value or an unevaluated
/// definition value (typically an expression) that is resolved lazily.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// An evaluated value.
    Value(Value),
    /// A definition value evaluated on lookup.
    Definition(DefinitionValue),
}

/// Named values passed into expression evaluation.
///
/// Arguments form a chain: a child layer sees every key of its parent unless it
/// overrides it. The reserved key `.` is the current item. Arguments are never
/// mutated in place; the builder methods and [`ViewArguments::merge`] return
/// new instances.
#[derive(Debug, Clone, Default)]
pub struct ViewArguments {
    values: BTreeMap<String, ArgumentValue>,
    parent: Option<Arc<ViewArguments>>,
    resolved: bool,
}

impl ViewArguments {
    /// An empty set with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new, empty layer on top of `parent`.
    pub fn layered(parent: Arc<ViewArguments>) -> Self {
        Self {
            values: BTreeMap::new(),
            parent: Some(parent),
            resolved: false,
        }
    }

    /// Builds arguments from definition properties. Literal values are stored
    /// evaluated; anything containing an expression is kept for later.
    pub fn from_definition(properties: &BTreeMap<String, DefinitionValue>) -> Self {
        let values = properties
            .iter()
            .map(|(k, v)| {
                let arg = match v.to_literal() {
                    Some(value) => ArgumentValue::Value(value),
                    None => ArgumentValue::Definition(v.clone()),
                };
                (k.clone(), arg)
            })
            .collect();
        Self {
            values,
            parent: None,
            resolved: false,
        }
    }

    /// Binds `name` to an evaluated value.
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values
            .insert(name.to_string(), ArgumentValue::Value(value.into()));
        self.resolved = false;
        self
    }

    /// Binds `name` to a definition value resolved later.
    pub fn with_definition(mut self, name: &str, value: DefinitionValue) -> Self {
        self.values
            .insert(name.to_string(), ArgumentValue::Definition(value));
        self.resolved = false;
        self
    }

    /// Binds the current item.
    pub fn with_item(self, item: ItemId) -> Self {
        self.with_value(CURRENT_ITEM_KEY, Value::Item(item))
    }

    /// Looks `name` up here, then in the parents.
    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        match self.values.get(name) {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    /// True when `name` is visible from this layer.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The item bound to `.`, if it is an evaluated item reference.
    pub fn current_item(&self) -> Option<ItemId> {
        match self.get(CURRENT_ITEM_KEY) {
            Some(ArgumentValue::Value(Value::Item(id))) => Some(*id),
            _ => None,
        }
    }

    /// True once every definition value has been evaluated.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// All visible keys with the nearest layer winning.
    pub fn flattened(&self) -> BTreeMap<String, ArgumentValue> {
        let mut all = match &self.parent {
            Some(parent) => parent.flattened(),
            None => BTreeMap::new(),
        };
        for (k, v) in &self.values {
            all.insert(k.clone(), v.clone());
        }
        all
    }

    /// A new instance holding the keys of both; keys in `other` win.
    pub fn merge(&self, other: &ViewArguments) -> ViewArguments {
        let mut values = self.flattened();
        values.extend(other.flattened());
        ViewArguments {
            values,
            parent: None,
            resolved: false,
        }
    }

    /// Evaluates every pending definition against `item` and returns a fully
    /// resolved, flattened copy. Entries that fail to evaluate become nil and
    /// are reported through the interpolator's diagnostics.
    pub fn resolve(&self, item: Option<ItemId>, interpolator: &Interpolator<'_>) -> ViewArguments {
        let mut context = ViewArguments {
            values: self.flattened(),
            parent: None,
            resolved: false,
        };
        if let Some(item) = item {
            context
                .values
                .insert(CURRENT_ITEM_KEY.to_string(), ArgumentValue::Value(Value::Item(item)));
        }

        let values = context
            .values
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    ArgumentValue::Value(value) => value.clone(),
                    ArgumentValue::Definition(def) => interpolator.evaluate_definition(def, &context),
                };
                (k.clone(), ArgumentValue::Value(value))
            })
            .collect();

        ViewArguments {
            values,
            parent: None,
            resolved: true,
        }
    }

    /// Evaluated value of `name`, only if it needs no further evaluation.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(ArgumentValue::Value(value)) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::Expression;
    use crate::core::functions::DefaultHost;
    use crate::core::graph::InMemoryGraph;

    #[test]
    fn test_layered_lookup_prefers_nearest() {
        let parent = Arc::new(ViewArguments::new().with_value("a", 1.0).with_value("b", 2.0));
        let child = ViewArguments::layered(parent).with_value("b", 3.0);

        assert_eq!(child.value("a"), Some(&Value::Number(1.0)));
        assert_eq!(child.value("b"), Some(&Value::Number(3.0)));
        assert_eq!(child.flattened().len(), 2);
    }

    #[test]
    fn test_merge_returns_new_instance() {
        let base = ViewArguments::new().with_value("mode", "read");
        let over = ViewArguments::new().with_value("mode", "edit").with_value("x", true);

        let merged = base.merge(&over);

        assert_eq!(merged.value("mode"), Some(&Value::from("edit")));
        assert_eq!(base.value("mode"), Some(&Value::from("read")));
        assert!(merged.contains("x"));
    }

    #[test]
    fn test_resolve_evaluates_pending_expressions() {
        // --- Setup ---
        let graph = InMemoryGraph::new();
        let item = graph.create_item(
            "Note",
            BTreeMap::from([("title".to_string(), Value::from("hello"))]),
        );
        let host = DefaultHost::new();
        let interpolator = Interpolator::new(&host, &graph);
        let args = ViewArguments::new().with_definition(
            "heading",
            DefinitionValue::Expression(Expression::bare(".title").unwrap()),
        );

        // --- Execute ---
        let resolved = args.resolve(Some(item), &interpolator);

        // --- Assert ---
        assert!(resolved.is_resolved());
        assert!(!args.is_resolved());
        assert_eq!(resolved.value("heading"), Some(&Value::from("hello")));
        assert_eq!(resolved.current_item(), Some(item));
    }
}
