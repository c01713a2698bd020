// src/core/view.rs

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::cascade::{Cascadable, ListPolicy, PropertyDecl};
use crate::core::datasource::{CascadingDatasource, DatasourceDescriptor};
use crate::models::{ActionDescriptor, Value};

/// Properties of a view definition and how each one cascades.
pub static VIEW_PROPERTIES: &[PropertyDecl] = &[
    PropertyDecl::scalar("title"),
    PropertyDecl::scalar("subtitle"),
    PropertyDecl::scalar("defaultRenderer"),
    PropertyDecl::scalar("activeRenderer"),
    PropertyDecl::scalar("emptyResultText"),
    PropertyDecl::scalar("actionButton"),
    PropertyDecl::scalar("editActionButton"),
    PropertyDecl::list("filterButtons", ListPolicy::Append),
    PropertyDecl::list("contextButtons", ListPolicy::Append),
    PropertyDecl::list("actionItems", ListPolicy::Append),
    PropertyDecl::list("navigateItems", ListPolicy::Append),
    PropertyDecl::list("editButtons", ListPolicy::Replace),
    PropertyDecl::dict("sections", true),
];

/// Everything the presentation layer needs to draw one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveView {
    /// Heading shown above the content.
    pub title: Option<String>,
    /// Secondary heading.
    pub subtitle: Option<String>,
    /// Renderer kind used to draw the items.
    pub renderer: String,
    /// Shown when the datasource yields nothing.
    pub empty_result_text: Option<String>,
    /// Primary action of the view.
    pub action_button: Option<ActionDescriptor>,
    /// Action shown in edit mode.
    pub edit_action_button: Option<ActionDescriptor>,
    /// Buttons that narrow the result set.
    pub filter_buttons: Vec<ActionDescriptor>,
    /// Actions on the current item.
    pub context_buttons: Vec<ActionDescriptor>,
    /// Menu actions.
    pub action_items: Vec<ActionDescriptor>,
    /// Navigation entries.
    pub navigate_items: Vec<ActionDescriptor>,
    /// Buttons shown while editing.
    pub edit_buttons: Vec<ActionDescriptor>,
    /// Section titles mapped to their entries.
    pub sections: BTreeMap<String, Vec<String>>,
    /// The query backing the view.
    pub datasource: DatasourceDescriptor,
}

impl EffectiveView {
    /// Plain JSON, with action arguments rendered as JSON values.
    pub fn to_json(&self) -> serde_json::Value {
        fn actions(list: &[ActionDescriptor]) -> serde_json::Value {
            serde_json::Value::Array(list.iter().map(ActionDescriptor::to_json).collect())
        }
        serde_json::json!({
            "title": self.title,
            "subtitle": self.subtitle,
            "renderer": self.renderer,
            "emptyResultText": self.empty_result_text,
            "actionButton": self.action_button.as_ref().map(ActionDescriptor::to_json),
            "editActionButton": self.edit_action_button.as_ref().map(ActionDescriptor::to_json),
            "filterButtons": actions(&self.filter_buttons),
            "contextButtons": actions(&self.context_buttons),
            "actionItems": actions(&self.action_items),
            "navigateItems": actions(&self.navigate_items),
            "editButtons": actions(&self.edit_buttons),
            "sections": self.sections,
            "datasource": {
                "query": self.datasource.query,
                "sortProperty": self.datasource.sort_property,
                "sortAscending": self.datasource.sort_ascending,
                "filter": self.datasource.filter,
                "key": self.datasource.unique_key(),
            },
        })
    }
}

/// Typed view of a view definition's cascade stack.
pub struct CascadingView<'a> {
    cascade: Cascadable<'a>,
    fallback_renderer: String,
}

impl<'a> CascadingView<'a> {
    /// `fallback_renderer` is used when no layer names a renderer.
    pub fn new(cascade: Cascadable<'a>, fallback_renderer: &str) -> Self {
        Self {
            cascade,
            fallback_renderer: fallback_renderer.to_string(),
        }
    }

    /// The underlying cascade.
    pub fn cascade(&self) -> &Cascadable<'a> {
        &self.cascade
    }

    /// Unwraps the cascade.
    pub fn into_cascade(self) -> Cascadable<'a> {
        self.cascade
    }

    /// Writes a view override.
    pub fn set_state(&mut self, name: &str, value: Value) {
        self.cascade.set_state(name, value);
    }

    /// Overrides the renderer for this session.
    pub fn set_active_renderer(&mut self, renderer: &str) {
        self.set_state("activeRenderer", Value::from(renderer));
    }

    /// `title`, resolved.
    pub fn title(&self) -> Option<String> {
        self.cascade.resolve_as("title")
    }

    /// `subtitle`, resolved.
    pub fn subtitle(&self) -> Option<String> {
        self.cascade.resolve_as("subtitle")
    }

    /// `emptyResultText`, resolved.
    pub fn empty_result_text(&self) -> Option<String> {
        self.cascade.resolve_as("emptyResultText")
    }

    /// The active renderer, else the default renderer, else the fallback.
    pub fn renderer_name(&self) -> String {
        self.cascade
            .resolve_as::<String>("activeRenderer")
            .or_else(|| self.cascade.resolve_as("defaultRenderer"))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.fallback_renderer.clone())
    }

    /// `actionButton` as an action.
    pub fn action_button(&self) -> Option<ActionDescriptor> {
        self.action("actionButton")
    }

    /// `editActionButton` as an action.
    pub fn edit_action_button(&self) -> Option<ActionDescriptor> {
        self.action("editActionButton")
    }

    /// `filterButtons`, appended across layers.
    pub fn filter_buttons(&self) -> Vec<ActionDescriptor> {
        self.actions("filterButtons")
    }

    /// `contextButtons`, appended across layers.
    pub fn context_buttons(&self) -> Vec<ActionDescriptor> {
        self.actions("contextButtons")
    }

    /// `actionItems`, appended across layers.
    pub fn action_items(&self) -> Vec<ActionDescriptor> {
        self.actions("actionItems")
    }

    /// `navigateItems`, appended across layers.
    pub fn navigate_items(&self) -> Vec<ActionDescriptor> {
        self.actions("navigateItems")
    }

    /// `editButtons` from the closest layer that sets it.
    pub fn edit_buttons(&self) -> Vec<ActionDescriptor> {
        self.actions("editButtons")
    }

    /// `sections` with entries rendered as text.
    pub fn sections(&self) -> BTreeMap<String, Vec<String>> {
        self.cascade
            .resolve("sections")
            .into_dict()
            .into_iter()
            .map(|(key, values)| {
                let values = values.iter().map(Value::to_display_string).collect();
                (key, values)
            })
            .collect()
    }

    /// Resolves every property into an [`EffectiveView`].
    pub fn effective(&self, datasource: &CascadingDatasource<'_>) -> EffectiveView {
        EffectiveView {
            title: self.title(),
            subtitle: self.subtitle(),
            renderer: self.renderer_name(),
            empty_result_text: self.empty_result_text(),
            action_button: self.action_button(),
            edit_action_button: self.edit_action_button(),
            filter_buttons: self.filter_buttons(),
            context_buttons: self.context_buttons(),
            action_items: self.action_items(),
            navigate_items: self.navigate_items(),
            edit_buttons: self.edit_buttons(),
            sections: self.sections(),
            datasource: datasource.descriptor(),
        }
    }

    fn action(&self, name: &str) -> Option<ActionDescriptor> {
        let value = self.cascade.resolve_as::<Value>(name)?;
        let action = ActionDescriptor::from_value(&value);
        if action.is_none() {
            debug!("'{}' does not describe an action: {:?}", name, value);
        }
        action
    }

    fn actions(&self, name: &str) -> Vec<ActionDescriptor> {
        self.cascade
            .resolve(name)
            .into_list()
            .iter()
            .filter_map(|value| {
                let action = ActionDescriptor::from_value(value);
                if action.is_none() {
                    debug!("Skipping non-action entry in '{}': {:?}", name, value);
                }
                action
            })
            .collect()
    }
}
