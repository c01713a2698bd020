// src/core/functions.rs

use std::collections::BTreeMap;

use crate::core::interpolator::{EvalError, EvalResult, ExpressionHost, FunctionContext};
use crate::core::view_arguments::ViewArguments;
use crate::models::{format_number, Item, Value};

/// Signature of a built-in function.
pub type FunctionHandler = fn(&FunctionContext<'_>, &[Value]) -> EvalResult<Value>;

/// A function callable from expressions, either as `name(x, ..)` or as a
/// method `x.name(..)` where the receiver becomes the first argument.
pub struct FunctionDefinition {
    /// Canonical name.
    pub name: &'static str,
    /// Other names that resolve to this function.
    pub aliases: &'static [&'static str],
    /// Implementation.
    pub handler: FunctionHandler,
}

static FUNCTION_REGISTRY: &[FunctionDefinition] = &[
    FunctionDefinition {
        name: "lowercased",
        aliases: &["lowercase"],
        handler: lowercased,
    },
    FunctionDefinition {
        name: "uppercased",
        aliases: &["uppercase"],
        handler: uppercased,
    },
    FunctionDefinition {
        name: "plural",
        aliases: &[],
        handler: plural,
    },
    FunctionDefinition {
        name: "camelCaseToWords",
        aliases: &[],
        handler: camel_case_to_words,
    },
    FunctionDefinition {
        name: "count",
        aliases: &[],
        handler: count,
    },
    FunctionDefinition {
        name: "first",
        aliases: &[],
        handler: first,
    },
    FunctionDefinition {
        name: "last",
        aliases: &[],
        handler: last,
    },
    FunctionDefinition {
        name: "join",
        aliases: &[],
        handler: join,
    },
    FunctionDefinition {
        name: "isEmpty",
        aliases: &[],
        handler: is_empty,
    },
    FunctionDefinition {
        name: "contains",
        aliases: &[],
        handler: contains,
    },
    FunctionDefinition {
        name: "default",
        aliases: &["orDefault"],
        handler: default_value,
    },
    FunctionDefinition {
        name: "format",
        aliases: &[],
        handler: format,
    },
    FunctionDefinition {
        name: "item",
        aliases: &["getItem"],
        handler: item,
    },
    FunctionDefinition {
        name: "edges",
        aliases: &[],
        handler: edges,
    },
];

/// Looks a function up by name or alias.
pub fn find_function(name: &str) -> Option<&'static FunctionDefinition> {
    FUNCTION_REGISTRY
        .iter()
        .find(|f| f.name == name || f.aliases.contains(&name))
}

/// Canonical names of every built-in.
pub fn function_names() -> impl Iterator<Item = &'static str> {
    FUNCTION_REGISTRY.iter().map(|f| f.name)
}

// --- ITEM PROPERTY REGISTRY ---
// Properties every item answers to regardless of its property bag.

struct ItemPropertyAccessor {
    name: &'static str,
    accessor: fn(&Item) -> Value,
}

static ITEM_PROPERTY_REGISTRY: &[ItemPropertyAccessor] = &[
    ItemPropertyAccessor {
        name: "uid",
        accessor: item_uid,
    },
    ItemPropertyAccessor {
        name: "type",
        accessor: item_type,
    },
    ItemPropertyAccessor {
        name: "id",
        accessor: item_id,
    },
];

fn item_uid(item: &Item) -> Value {
    Value::String(item.uid.clone())
}

fn item_type(item: &Item) -> Value {
    Value::String(item.item_type.clone())
}

fn item_id(item: &Item) -> Value {
    Value::Number(item.id.0 as f64)
}

/// Resolves a built-in item property, if `name` is one.
pub fn item_property(item: &Item, name: &str) -> Option<Value> {
    ITEM_PROPERTY_REGISTRY
        .iter()
        .find(|p| p.name == name)
        .map(|p| (p.accessor)(item))
}

// --- DEFAULT HOST ---

/// Host with the built-in function registry and a table of global names.
#[derive(Debug, Default, Clone)]
pub struct DefaultHost {
    globals: BTreeMap<String, Value>,
}

impl DefaultHost {
    /// A host with only the built-in variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host-wide variable, readable as `$name`.
    pub fn with_global(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_string(), value);
        self
    }
}

struct HostVariable {
    name: &'static str,
    accessor: fn(&ViewArguments) -> Value,
}

// Variables every host answers to, consulted after the globals table.
static HOST_VARIABLE_REGISTRY: &[HostVariable] = &[
    HostVariable {
        name: "currentItem",
        accessor: current_item,
    },
    HostVariable {
        name: "argumentNames",
        accessor: argument_names,
    },
];

fn current_item(args: &ViewArguments) -> Value {
    args.current_item().map(Value::Item).unwrap_or(Value::Null)
}

fn argument_names(args: &ViewArguments) -> Value {
    Value::List(args.flattened().into_keys().map(Value::String).collect())
}

impl ExpressionHost for DefaultHost {
    fn lookup(&self, name: &str, args: &ViewArguments) -> Option<Value> {
        if let Some(value) = self.globals.get(name) {
            return Some(value.clone());
        }
        HOST_VARIABLE_REGISTRY
            .iter()
            .find(|v| v.name == name)
            .map(|v| (v.accessor)(args))
    }

    fn exec(&self, name: &str, ctx: &FunctionContext<'_>, call_args: &[Value]) -> Option<EvalResult<Value>> {
        find_function(name).map(|f| (f.handler)(ctx, call_args))
    }
}

// --- HANDLERS ---

fn arity_error(name: &str, expected: &str, args: &[Value]) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected: expected.to_string(),
        found: args.len(),
    }
}

fn one<'v>(name: &str, args: &'v [Value]) -> EvalResult<&'v Value> {
    match args {
        [value] => Ok(value),
        _ => Err(arity_error(name, "1", args)),
    }
}

fn two<'v>(name: &str, args: &'v [Value]) -> EvalResult<(&'v Value, &'v Value)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(arity_error(name, "2", args)),
    }
}

/// Applies a string transform; nil passes through unchanged.
fn map_string(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> EvalResult<Value> {
    match one(name, args)? {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(f(s))),
        Value::Number(n) => Ok(Value::String(f(&format_number(*n)))),
        other => Err(EvalError::InvalidArgument {
            name: name.to_string(),
            message: format!("expected a string, got {}", other.type_name()),
        }),
    }
}

fn lowercased(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    map_string("lowercased", args, str::to_lowercase)
}

fn uppercased(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    map_string("uppercased", args, str::to_uppercase)
}

fn plural(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    map_string("plural", args, pluralize)
}

fn camel_case_to_words(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    map_string("camelCaseToWords", args, camel_to_words)
}

fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        let stem = word.strip_suffix(['y', 'Y']).unwrap_or(word);
        format!("{}ies", stem)
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// `dateCreated` becomes `Date created`.
fn camel_to_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for (i, c) in text.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn count(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let n = match one("count", args)? {
        Value::Null => 0,
        Value::List(items) => items.len(),
        Value::Dict(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 1,
    };
    Ok(Value::Number(n as f64))
}

fn first(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(match one("first", args)? {
        Value::List(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    })
}

fn last(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(match one("last", args)? {
        Value::List(items) => items.last().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    })
}

fn join(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let (subject, separator) = match args {
        [subject] => (subject, None),
        [subject, separator] => (subject, Some(separator)),
        _ => return Err(arity_error("join", "1-2", args)),
    };
    let separator = match separator {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(EvalError::InvalidArgument {
                name: "join".to_string(),
                message: format!("separator must be a string, got {}", other.type_name()),
            });
        }
        None => ", ",
    };
    Ok(match subject {
        Value::List(items) => Value::String(
            items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(separator),
        ),
        other => Value::String(other.to_display_string()),
    })
}

fn is_empty(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let empty = match one("isEmpty", args)? {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Dict(map) => map.is_empty(),
        _ => false,
    };
    Ok(Value::Bool(empty))
}

fn contains(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let found = match two("contains", args)? {
        (Value::String(haystack), needle) => haystack
            .to_lowercase()
            .contains(&needle.to_display_string().to_lowercase()),
        (Value::List(items), needle) => items.contains(needle),
        (Value::Dict(map), Value::String(key)) => map.contains_key(key),
        (Value::Null, _) => false,
        (other, _) => {
            return Err(EvalError::InvalidArgument {
                name: "contains".to_string(),
                message: format!("cannot search a {}", other.type_name()),
            });
        }
    };
    Ok(Value::Bool(found))
}

/// `format('%s of %s', a, b)` substitutes each `%s` in turn.
fn format(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let (template, values) = match args.split_first() {
        Some((template, values)) if values.len() <= 8 => (template, values),
        _ => return Err(arity_error("format", "1-9", args)),
    };
    let Some(template) = template.as_str() else {
        return Err(EvalError::InvalidArgument {
            name: "format".to_string(),
            message: format!("template must be a string, got {}", template.type_name()),
        });
    };
    let mut pieces = template.split("%s");
    let mut out = pieces.next().unwrap_or_default().to_string();
    let mut values = values.iter();
    for piece in pieces {
        if let Some(value) = values.next() {
            out.push_str(&value.to_display_string());
        }
        out.push_str(piece);
    }
    Ok(Value::String(out))
}

fn default_value(_ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let (value, fallback) = two("default", args)?;
    Ok(if value.is_null() {
        fallback.clone()
    } else {
        value.clone()
    })
}

/// `item(Type, uid)` looks an item up in the graph; nil when absent.
fn item(ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let (item_type, uid) = two("item", args)?;
    let (Some(item_type), Some(uid)) = (item_type.as_str(), uid.as_str()) else {
        return Err(EvalError::InvalidArgument {
            name: "item".to_string(),
            message: "expected a type name and a uid".to_string(),
        });
    };
    Ok(ctx
        .graph
        .get(item_type, uid)
        .map(|item| Value::Item(item.id))
        .unwrap_or(Value::Null))
}

/// `edges(item, edgeType)` lists the targets of an item's outgoing edges.
fn edges(ctx: &FunctionContext<'_>, args: &[Value]) -> EvalResult<Value> {
    let (source, edge_type) = two("edges", args)?;
    let Some(edge_type) = edge_type.as_str() else {
        return Err(EvalError::InvalidArgument {
            name: "edges".to_string(),
            message: "edge type must be a string".to_string(),
        });
    };
    match source {
        Value::Item(id) => Ok(Value::List(
            ctx.graph
                .edges(*id, edge_type)
                .into_iter()
                .map(|edge| Value::Item(edge.target))
                .collect(),
        )),
        Value::Null => Ok(Value::List(Vec::new())),
        other => Err(EvalError::InvalidArgument {
            name: "edges".to_string(),
            message: format!("expected an item, got {}", other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::InMemoryGraph;

    fn call(graph: &InMemoryGraph, name: &str, args: &[Value]) -> EvalResult<Value> {
        let view_args = ViewArguments::new();
        let ctx = FunctionContext {
            args: &view_args,
            graph,
        };
        (find_function(name).unwrap().handler)(&ctx, args)
    }

    #[test]
    fn test_registry_resolves_aliases() {
        assert_eq!(find_function("lowercase").unwrap().name, "lowercased");
        assert!(find_function("nothing").is_none());
        assert!(function_names().any(|n| n == "plural"));
    }

    #[test]
    fn test_string_functions() {
        let graph = InMemoryGraph::new();
        assert_eq!(call(&graph, "plural", &["Person".into()]), Ok("Persons".into()));
        assert_eq!(call(&graph, "plural", &["Category".into()]), Ok("Categories".into()));
        assert_eq!(call(&graph, "plural", &["Box".into()]), Ok("Boxes".into()));
        assert_eq!(call(&graph, "camelCaseToWords", &["dateCreated".into()]), Ok("Date created".into()));
        assert_eq!(call(&graph, "lowercased", &[Value::Null]), Ok(Value::Null));
        assert!(matches!(call(&graph, "lowercased", &[]), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_collection_functions() {
        let graph = InMemoryGraph::new();
        let list = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(call(&graph, "count", &[list.clone()]), Ok(Value::Number(2.0)));
        assert_eq!(call(&graph, "first", &[list.clone()]), Ok("a".into()));
        assert_eq!(call(&graph, "join", &[list.clone(), " / ".into()]), Ok("a / b".into()));
        assert_eq!(call(&graph, "contains", &[list, "b".into()]), Ok(Value::Bool(true)));
        assert_eq!(call(&graph, "isEmpty", &["".into()]), Ok(Value::Bool(true)));
        assert_eq!(call(&graph, "default", &[Value::Null, 1.0.into()]), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_format_substitutes_in_order() {
        let graph = InMemoryGraph::new();
        assert_eq!(
            call(&graph, "format", &["%s of %s".into(), 1.0.into(), "two".into()]),
            Ok("1 of two".into())
        );
        assert_eq!(call(&graph, "format", &["%s!".into()]), Ok("!".into()));
    }

    #[test]
    fn test_wrong_argument_counts_are_errors() {
        let graph = InMemoryGraph::new();
        let too_many: Vec<Value> = std::iter::repeat_n(Value::from("x"), 10).collect();
        assert!(matches!(call(&graph, "format", &too_many), Err(EvalError::Arity { found: 10, .. })));
        assert!(matches!(call(&graph, "format", &[]), Err(EvalError::Arity { found: 0, .. })));
        assert!(matches!(call(&graph, "join", &[]), Err(EvalError::Arity { .. })));
        assert!(matches!(call(&graph, "contains", &["a".into()]), Err(EvalError::Arity { .. })));
        assert!(matches!(call(&graph, "edges", &[Value::Null]), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_plural_keeps_case_of_stem() {
        let graph = InMemoryGraph::new();
        assert_eq!(call(&graph, "plural", &["CATEGORY".into()]), Ok("CATEGORies".into()));
        assert_eq!(call(&graph, "plural", &["y".into()]), Ok("ies".into()));
        assert_eq!(call(&graph, "plural", &["Day".into()]), Ok("Days".into()));
    }

    #[test]
    fn test_host_variable_registry() {
        let host = DefaultHost::new().with_global("appName", "Memo".into());
        let args = ViewArguments::new().with_item(crate::models::ItemId(4));
        assert_eq!(host.lookup("appName", &args), Some("Memo".into()));
        assert_eq!(host.lookup("currentItem", &args), Some(Value::Item(crate::models::ItemId(4))));
        assert_eq!(host.lookup("unknown", &args), None);
    }

    #[test]
    fn test_graph_functions() {
        let graph = InMemoryGraph::new();
        let person = graph
            .create_item_with_uid("Person", "p1", BTreeMap::new())
            .unwrap();
        let address = graph.create_item("Address", BTreeMap::new());
        graph.link(person, address, "address").unwrap();

        assert_eq!(call(&graph, "item", &["Person".into(), "p1".into()]), Ok(Value::Item(person)));
        assert_eq!(call(&graph, "item", &["Person".into(), "zz".into()]), Ok(Value::Null));
        assert_eq!(
            call(&graph, "edges", &[Value::Item(person), "address".into()]),
            Ok(Value::List(vec![Value::Item(address)]))
        );
    }

    #[test]
    fn test_item_property_registry() {
        let graph = InMemoryGraph::new();
        let id = graph.create_item_with_uid("Note", "n1", BTreeMap::new()).unwrap();
        let note = crate::core::graph::ItemGraph::item(&graph, id).unwrap();
        assert_eq!(item_property(&note, "uid"), Some("n1".into()));
        assert_eq!(item_property(&note, "type"), Some("Note".into()));
        assert_eq!(item_property(&note, "title"), None);
    }
}
