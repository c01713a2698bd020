// tests/cascade_scenarios.rs

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use cvu::constants::DEFAULT_GROUP;
use cvu::core::cascade::{Cascadable, CascadeStack};
use cvu::core::catalog::{CatalogSource, LoadMode, Origin, ViewCatalog, ViewRequest};
use cvu::core::datasource::{CascadingDatasource, DatasourceDescriptor, DATASOURCE_PROPERTIES};
use cvu::core::expression::Expression;
use cvu::core::functions::DefaultHost;
use cvu::core::graph::InMemoryGraph;
use cvu::core::interpolator::Interpolator;
use cvu::core::parser::{normalize_element_array, parse};
use cvu::core::printer::to_cvu_string;
use cvu::core::scheduler::ManualScheduler;
use cvu::core::session::{StateTarget, ViewSession};
use cvu::core::view::VIEW_PROPERTIES;
use cvu::core::view_arguments::ViewArguments;
use cvu::models::{DefinitionValue, Domain, ParsedDefinition, Selector, Value};
use cvu::state::{AppContext, ViewStates};

fn stack_of(sources: &[&str]) -> CascadeStack {
    sources
        .iter()
        .fold(CascadeStack::new(), |stack, source| stack.with_layer(parse(source).unwrap()))
}

fn datasource_descriptor(sources: &[&str]) -> DatasourceDescriptor {
    let graph = InMemoryGraph::new();
    let host = DefaultHost::new();
    let cascade = Cascadable::new(stack_of(sources), DATASOURCE_PROPERTIES, Interpolator::new(&host, &graph));
    CascadingDatasource::new(cascade).descriptor()
}

#[test]
fn test_three_layer_datasource_cascade() {
    let descriptor = datasource_descriptor(&[
        "[datasource = pod] { query: \"test\" }",
        "[datasource = pod] { sortProperty: \"foo\" }",
        "[datasource = pod] { sortAscending: false }",
    ]);

    assert_eq!(descriptor.query.as_deref(), Some("test"));
    assert_eq!(descriptor.sort_property.as_deref(), Some("foo"));
    assert_eq!(descriptor.sort_ascending, Some(false));
}

#[test]
fn test_scalar_override() {
    let descriptor = datasource_descriptor(&[
        "[datasource = pod] { sortAscending: true }",
        "[datasource = pod] { sortAscending: false }",
    ]);

    assert_eq!(descriptor.sort_ascending, Some(false));
}

#[test]
fn test_expression_resolves_against_current_item() {
    // --- Setup ---
    let graph = InMemoryGraph::new();
    let mut properties = BTreeMap::new();
    properties.insert("title".to_string(), Value::from("hello"));
    let item = graph.create_item("Note", properties);
    let host = DefaultHost::new();
    let cascade = Cascadable::new(
        stack_of(&["[view] { test: {{ .title }} }"]),
        VIEW_PROPERTIES,
        Interpolator::new(&host, &graph),
    )
    .with_arguments(ViewArguments::new().with_item(item));

    // --- Execute ---
    let value = cascade.cascade_property("test");

    // --- Assert ---
    assert_eq!(value, Some(Value::from("hello")));
}

#[test]
fn test_unique_keys() {
    let ascending = datasource_descriptor(&["[datasource = pod] { query: \"Note\" sortProperty: \"a\" sortAscending: true }"]);
    let descending = datasource_descriptor(&["[datasource = pod] { query: \"Note\" sortProperty: \"a\" sortAscending: false }"]);
    let same = datasource_descriptor(&[
        "[datasource = pod] { query: \"Note\" }",
        "[datasource = pod] { sortProperty: \"a\" sortAscending: true }",
    ]);

    assert_ne!(ascending.unique_key(), descending.unique_key());
    assert_eq!(ascending.unique_key(), same.unique_key());
}

#[test]
fn test_list_merge_and_merge_false() {
    let graph = InMemoryGraph::new();
    let host = DefaultHost::new();
    let names = |sources: &[&str]| -> Vec<Value> {
        Cascadable::new(stack_of(sources), VIEW_PROPERTIES, Interpolator::new(&host, &graph))
            .cascade_list("contextButtons", true)
    };

    let merged = names(&[
        "[view] { contextButtons: [a, b] }",
        "Note { contextButtons: [c] }",
        ".mine { contextButtons: [d] }",
    ]);
    let stopped = names(&[
        "[view] { contextButtons: [a, b] }",
        "Note { merge: false contextButtons: [c] }",
        ".mine { contextButtons: [d] }",
    ]);

    assert_eq!(merged, vec![Value::from("d"), Value::from("c"), Value::from("a"), Value::from("b")]);
    assert_eq!(stopped, vec![Value::from("d"), Value::from("c")]);
}

const CATALOG: &str = r#"
    [view] { title: "Untitled" }
    [renderer = list] {
        VStack {
            Text { text: "{.title}" }
            Text { text: "{.content}" }
        }
    }
    Note[] {
        title: "All notes"
        [datasource = pod] { query: "Note" }
    }
"#;

fn context() -> AppContext {
    let catalog = ViewCatalog::from_sources(
        vec![CatalogSource::new("defaults.cvu", Origin::Default, CATALOG)],
        LoadMode::Strict,
    )
    .unwrap();
    AppContext::in_memory(catalog)
}

#[test]
fn test_render_twice_returns_cached_tree() {
    // --- Setup ---
    let ctx = context();
    let request = ViewRequest::for_type("Note", true);

    // --- Execute ---
    let first = {
        let resolved = ctx.resolve_view(&request, &ViewStates::default(), &ViewArguments::new()).unwrap();
        resolved.render_config().render(None, DEFAULT_GROUP).tree
    };
    let second = {
        let resolved = ctx.resolve_view(&request, &ViewStates::default(), &ViewArguments::new()).unwrap();
        resolved.render_config().render(None, DEFAULT_GROUP).tree
    };

    // --- Assert ---
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.node_count(), 3);
    assert_eq!(ctx.render_cache().stats().misses, 1);
}

#[test]
fn test_debounced_session_recomputes_once() {
    // --- Setup ---
    let scheduler = Rc::new(ManualScheduler::new());
    let session = ViewSession::new(Rc::new(context()), ViewRequest::for_type("Note", true), scheduler.clone());
    let refreshed = Rc::new(std::cell::Cell::new(0));
    let counter = Rc::clone(&refreshed);
    session.on_refresh(move |_| counter.set(counter.get() + 1));

    // --- Execute ---
    for n in 0..25 {
        session.set_state(StateTarget::View, "title", Value::from(format!("title {}", n)));
        session.notify_data_changed();
    }
    scheduler.run_pending();

    // --- Assert ---
    assert_eq!(session.recompute_count(), 1);
    assert_eq!(refreshed.get(), 1);
    assert_eq!(session.effective().unwrap().title.as_deref(), Some("title 24"));
}

#[test]
fn test_broken_user_definition_degrades_one_view() {
    let catalog = ViewCatalog::from_sources(
        vec![
            CatalogSource::new("defaults.cvu", Origin::Default, CATALOG),
            CatalogSource::new("user.cvu", Origin::User, "Note[] { title: \"Mine\" }\nPerson { title: }"),
        ],
        LoadMode::Lenient,
    )
    .unwrap();
    let ctx = AppContext::in_memory(catalog);

    let resolved = ctx
        .resolve_view(&ViewRequest::for_type("Note", true), &ViewStates::default(), &ViewArguments::new())
        .unwrap();

    assert_eq!(ctx.catalog().issues().len(), 1);
    assert_eq!(resolved.effective().title.as_deref(), Some("Mine"));
}

// --- Round trip ---

const ELEMENT_KINDS: &[&str] = &["VStack", "HStack", "Text", "Image", "Spacer"];
const ACTION_NAMES: &[&str] = &["addItem", "openView", "toggleEditMode"];
const BARE_EXPRESSIONS: &[&str] = &[".title", "$a == 1", "count(.labels)", "!.starred ? 'a' : .b.c"];
const INTERPOLATED_EXPRESSIONS: &[&str] = &["Hi {.name}", "{.title} ({count(.labels)})", "{$a}"];

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9]{0,8}".prop_filter("reserved key", |k| k != "tree")
}

fn kind_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(ELEMENT_KINDS).prop_map(str::to_string)
}

fn expression_strategy() -> impl Strategy<Value = DefinitionValue> {
    prop_oneof![
        prop::sample::select(BARE_EXPRESSIONS).prop_map(|s| Expression::bare(s).unwrap()),
        prop::sample::select(INTERPOLATED_EXPRESSIONS).prop_map(|s| Expression::interpolated(s).unwrap()),
    ]
    .prop_map(DefinitionValue::Expression)
}

fn value_strategy() -> impl Strategy<Value = DefinitionValue> {
    let leaf = prop_oneof![
        Just(DefinitionValue::Null),
        any::<bool>().prop_map(DefinitionValue::Bool),
        (-1000i32..1000).prop_map(|n| DefinitionValue::Number(f64::from(n))),
        "[a-zA-Z0-9 _.,!?-]{0,12}".prop_map(DefinitionValue::String),
        expression_strategy(),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(DefinitionValue::List),
            prop::collection::btree_map(key_strategy(), inner.clone(), 1..4).prop_map(DefinitionValue::Dict),
            (
                prop::sample::select(ACTION_NAMES),
                prop::collection::btree_map(key_strategy(), inner, 0..3),
            )
                .prop_map(|(name, properties)| {
                    DefinitionValue::Node(Box::new(ParsedDefinition {
                        selector: Selector::Action(name.to_string()),
                        properties,
                        children: Vec::new(),
                    }))
                }),
        ]
    })
}

fn properties_strategy() -> impl Strategy<Value = BTreeMap<String, DefinitionValue>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..4)
}

/// Element blocks such as `VStack { spacing: 4 Text { .. } }`.
fn element_strategy() -> impl Strategy<Value = ParsedDefinition> {
    let leaf = (kind_strategy(), properties_strategy()).prop_map(|(kind, properties)| ParsedDefinition {
        selector: Selector::Element(kind),
        properties,
        children: Vec::new(),
    });
    leaf.prop_recursive(2, 8, 3, |inner| {
        (kind_strategy(), properties_strategy(), prop::collection::vec(inner, 0..3)).prop_map(
            |(kind, properties, children)| ParsedDefinition {
                selector: Selector::Element(kind),
                properties,
                children,
            },
        )
    })
}

/// One element of the `tree` array shorthand: a kind, then optional
/// properties, then optional children.
fn tree_entry_strategy() -> impl Strategy<Value = Vec<DefinitionValue>> {
    let props = || prop::option::of(prop::collection::btree_map(key_strategy(), value_strategy(), 0..3));
    let leaf = (kind_strategy(), props()).prop_map(|(kind, props)| {
        let mut entry = vec![DefinitionValue::String(kind)];
        entry.extend(props.map(DefinitionValue::Dict));
        entry
    });
    leaf.prop_recursive(2, 8, 3, move |inner| {
        (kind_strategy(), props(), prop::collection::vec(inner, 0..3)).prop_map(|(kind, props, children)| {
            let mut entry = vec![DefinitionValue::String(kind)];
            entry.extend(props.map(DefinitionValue::Dict));
            entry.push(DefinitionValue::List(children.concat()));
            entry
        })
    })
}

fn tree_strategy() -> impl Strategy<Value = DefinitionValue> {
    prop::collection::vec(tree_entry_strategy(), 1..3).prop_map(|entries| DefinitionValue::List(entries.concat()))
}

fn selector_strategy() -> impl Strategy<Value = Selector> {
    prop_oneof![
        Just(Selector::type_selector("Note", false)),
        Just(Selector::type_selector("Person", true)),
        Just(Selector::named("allNotes")),
        Just(Selector::domain(Domain::View, None)),
        Just(Selector::domain(Domain::Renderer, Some("list"))),
        Just(Selector::domain(Domain::Datasource, Some("pod"))),
    ]
}

fn definition_strategy() -> impl Strategy<Value = ParsedDefinition> {
    (
        selector_strategy(),
        properties_strategy(),
        prop::option::of(tree_strategy()),
        prop::collection::vec(element_strategy(), 0..3),
    )
        .prop_map(|(selector, mut properties, tree, children)| {
            if let Some(tree) = tree {
                properties.insert("tree".to_string(), tree);
            }
            ParsedDefinition {
                selector,
                properties,
                children,
            }
        })
}

proptest! {
    #[test]
    fn test_parse_print_round_trip(definition in definition_strategy()) {
        let printed = to_cvu_string(&definition);
        let reparsed = parse(&printed).unwrap();
        prop_assert_eq!(&reparsed, &definition);
        prop_assert_eq!(parse(&to_cvu_string(&reparsed)).unwrap(), reparsed);
    }

    #[test]
    fn test_printed_elements_survive_as_render_tree(
        elements in prop::collection::vec(element_strategy(), 1..3),
        tree in tree_strategy(),
    ) {
        let definition = ParsedDefinition {
            selector: Selector::domain(Domain::Renderer, Some("list")),
            properties: BTreeMap::from([("tree".to_string(), tree)]),
            children: elements,
        };
        let reparsed = parse(&to_cvu_string(&definition)).unwrap();
        prop_assert!(reparsed.has_render_description());
        prop_assert_eq!(reparsed.elements().count(), definition.children.len());
        let Some(DefinitionValue::List(items)) = reparsed.get("tree") else {
            panic!("tree shorthand was not kept");
        };
        prop_assert!(normalize_element_array(items).is_ok());
    }
}
