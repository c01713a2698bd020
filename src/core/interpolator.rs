// src/core/interpolator.rs

use std::cell::RefCell;
use std::collections::HashSet;
use thiserror::Error;

use crate::constants::{CURRENT_ITEM_KEY, MAX_RECURSION_DEPTH};
use crate::core::diagnostics::{DiagnosticKind, Diagnostics};
use crate::core::expression::{BinaryOp, ExprNode, Expression, Segment, UnaryOp};
use crate::core::functions;
use crate::core::graph::ItemGraph;
use crate::core::view_arguments::{ArgumentValue, ViewArguments};
use crate::models::{DefinitionValue, FromValue, Value};

/// Why an expression could not be evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Neither the view arguments nor the host know the name.
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    /// No built-in or host function has this name.
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// `.` was used without a current item.
    #[error("No item is bound to '.'")]
    NoCurrentItem,

    /// A property was read from a value that has none.
    #[error("Cannot read property '{property}' of a {type_name} value")]
    InvalidPropertyAccess {
        /// The property name.
        property: String,
        /// Type of the value it was read from.
        type_name: &'static str,
    },

    /// An operator got operands it does not support.
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        /// The operator symbol.
        op: String,
        /// Type of the left operand.
        left: &'static str,
        /// Type of the right operand.
        right: &'static str,
    },

    /// A function was called with the wrong number of arguments.
    #[error("Function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        /// The function name.
        name: String,
        /// Accepted count, such as `2` or `1-2`.
        expected: String,
        /// Count actually passed.
        found: usize,
    },

    /// A function rejected one of its arguments.
    #[error("Invalid argument for '{name}': {message}")]
    InvalidArgument {
        /// The function name.
        name: String,
        /// Why the argument was rejected.
        message: String,
    },

    /// The right operand of `/` was zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// An argument definition refers back to itself.
    #[error("Circular reference detected while resolving '{0}'")]
    CircularReference(String),

    /// Argument definitions nest deeper than the limit.
    #[error("Maximum evaluation depth ({0}) exceeded")]
    MaxRecursionDepth(u32),
}

/// Result alias for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// What a host function sees of the evaluation.
pub struct FunctionContext<'a> {
    /// Arguments of the expression being evaluated.
    pub args: &'a ViewArguments,
    /// The item graph.
    pub graph: &'a dyn ItemGraph,
}

/// Resolves the names an expression cannot resolve on its own.
///
/// `lookup` is consulted for variables that are not view arguments; `exec`
/// runs named functions and returns `None` when the name is unknown.
pub trait ExpressionHost {
    fn lookup(&self, name: &str, args: &ViewArguments) -> Option<Value>;

    fn exec(&self, name: &str, ctx: &FunctionContext<'_>, call_args: &[Value]) -> Option<EvalResult<Value>>;
}

/// Tracks nesting while argument definitions refer to one another.
#[derive(Default)]
struct EvalState {
    depth: u32,
    resolving: HashSet<String>,
}

/// Evaluates parsed expressions against view arguments and the item graph.
pub struct Interpolator<'a> {
    host: &'a dyn ExpressionHost,
    graph: &'a dyn ItemGraph,
    diagnostics: Option<&'a Diagnostics>,
    state: RefCell<EvalState>,
}

impl Clone for Interpolator<'_> {
    /// Clones share the host, graph and diagnostics but start with a fresh
    /// evaluation state.
    fn clone(&self) -> Self {
        Self {
            host: self.host,
            graph: self.graph,
            diagnostics: self.diagnostics,
            state: RefCell::new(EvalState::default()),
        }
    }
}

impl<'a> Interpolator<'a> {
    /// An evaluator without a diagnostics sink.
    pub fn new(host: &'a dyn ExpressionHost, graph: &'a dyn ItemGraph) -> Self {
        Self {
            host,
            graph,
            diagnostics: None,
            state: RefCell::new(EvalState::default()),
        }
    }

    /// Failed evaluations are also recorded in `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: &'a Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// The graph expressions read from.
    pub fn graph(&self) -> &'a dyn ItemGraph {
        self.graph
    }

    /// The sink failed evaluations are recorded in, if any.
    pub fn diagnostics(&self) -> Option<&'a Diagnostics> {
        self.diagnostics
    }

    /// Evaluates `expression` against `args`, propagating any error.
    pub fn evaluate(&self, expression: &Expression, args: &ViewArguments) -> EvalResult<Value> {
        self.eval(expression.ast(), args)
    }

    /// Evaluates and converts to `T`. Errors are logged and yield `None`, as
    /// does a value of the wrong shape.
    pub fn evaluate_as<T: FromValue>(&self, expression: &Expression, args: &ViewArguments) -> Option<T> {
        T::from_value(self.evaluate_or_log(expression, args))
    }

    /// Evaluates, turning failures into nil plus a diagnostic.
    pub fn evaluate_or_log(&self, expression: &Expression, args: &ViewArguments) -> Value {
        match self.evaluate(expression, args) {
            Ok(value) => value,
            Err(e) => {
                self.report(expression.source(), &e);
                Value::Null
            }
        }
    }

    /// Evaluates a definition value recursively. Inline action or element
    /// nodes become dictionaries keyed by `action` or `element`.
    pub fn evaluate_definition(&self, value: &DefinitionValue, args: &ViewArguments) -> Value {
        match value {
            DefinitionValue::Null => Value::Null,
            DefinitionValue::Bool(b) => Value::Bool(*b),
            DefinitionValue::Number(n) => Value::Number(*n),
            DefinitionValue::String(s) => Value::String(s.clone()),
            DefinitionValue::Expression(expression) => self.evaluate_or_log(expression, args),
            DefinitionValue::List(items) => {
                Value::List(items.iter().map(|v| self.evaluate_definition(v, args)).collect())
            }
            DefinitionValue::Dict(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.evaluate_definition(v, args)))
                    .collect(),
            ),
            DefinitionValue::Node(node) => {
                let mut dict: std::collections::BTreeMap<String, Value> = node
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), self.evaluate_definition(v, args)))
                    .collect();
                dict.insert(
                    node.selector.node_key().to_string(),
                    Value::String(node.selector.to_string()),
                );
                Value::Dict(dict)
            }
        }
    }

    fn report(&self, source: &str, error: &EvalError) {
        match self.diagnostics {
            Some(diagnostics) => diagnostics.record(DiagnosticKind::Expression, source, error.to_string()),
            None => log::warn!("Failed to evaluate '{}': {}", source, error),
        }
    }

    fn eval(&self, node: &ExprNode, args: &ViewArguments) -> EvalResult<Value> {
        match node {
            ExprNode::Literal(value) => Ok(value.clone()),
            ExprNode::CurrentItem => match args.get(CURRENT_ITEM_KEY) {
                Some(arg) => self.resolve_argument(CURRENT_ITEM_KEY, arg, args),
                None => Err(EvalError::NoCurrentItem),
            },
            ExprNode::Property { target, name } => {
                let target = self.eval(target, args)?;
                self.property_of(&target, name)
            }
            ExprNode::Variable { name, .. } => self.lookup_variable(name, args),
            ExprNode::Call {
                name,
                receiver,
                args: call_args,
            } => {
                let mut values = Vec::with_capacity(call_args.len() + 1);
                if let Some(receiver) = receiver {
                    values.push(self.eval(receiver, args)?);
                }
                for arg in call_args {
                    values.push(self.eval_call_argument(arg, args)?);
                }
                let ctx = FunctionContext {
                    args,
                    graph: self.graph,
                };
                match self.host.exec(name, &ctx, &values) {
                    Some(result) => result,
                    None => Err(EvalError::UnknownFunction(name.clone())),
                }
            }
            ExprNode::Unary { op, operand } => {
                let value = self.eval(operand, args)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Negate => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(EvalError::TypeMismatch {
                            op: "-".to_string(),
                            left: "nothing",
                            right: other.type_name(),
                        }),
                    },
                }
            }
            ExprNode::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, args),
            ExprNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, args)?.is_truthy() {
                    self.eval(then_branch, args)
                } else {
                    self.eval(else_branch, args)
                }
            }
            ExprNode::Interpolation(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Expr(expr) => out.push_str(&self.eval(expr, args)?.to_display_string()),
                    }
                }
                Ok(Value::String(out))
            }
        }
    }

    /// A bare identifier passed to a function that resolves to nothing is
    /// taken as its own name, so `item(Person, 'uid')` works unquoted.
    fn eval_call_argument(&self, node: &ExprNode, args: &ViewArguments) -> EvalResult<Value> {
        if let ExprNode::Variable { name, sigil: false } = node {
            return match self.lookup_variable(name, args) {
                Err(EvalError::UnknownVariable(_)) => Ok(Value::String(name.clone())),
                other => other,
            };
        }
        self.eval(node, args)
    }

    fn lookup_variable(&self, name: &str, args: &ViewArguments) -> EvalResult<Value> {
        if let Some(arg) = args.get(name) {
            return self.resolve_argument(name, arg, args);
        }
        self.host
            .lookup(name, args)
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }

    /// Resolves an argument, evaluating it first when it is still a
    /// definition. Guards against arguments that refer to each other.
    fn resolve_argument(&self, name: &str, arg: &ArgumentValue, args: &ViewArguments) -> EvalResult<Value> {
        let definition = match arg {
            ArgumentValue::Value(value) => return Ok(value.clone()),
            ArgumentValue::Definition(definition) => definition,
        };

        {
            let mut state = self.state.borrow_mut();
            if state.depth >= MAX_RECURSION_DEPTH {
                return Err(EvalError::MaxRecursionDepth(MAX_RECURSION_DEPTH));
            }
            if !state.resolving.insert(name.to_string()) {
                return Err(EvalError::CircularReference(name.to_string()));
            }
            state.depth += 1;
        }

        let result = match definition {
            DefinitionValue::Expression(expression) => self.evaluate(expression, args),
            other => Ok(self.evaluate_definition(other, args)),
        };

        let mut state = self.state.borrow_mut();
        state.depth -= 1;
        state.resolving.remove(name);
        result
    }

    fn property_of(&self, target: &Value, name: &str) -> EvalResult<Value> {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Item(id) => {
                let Some(item) = self.graph.item(*id) else {
                    log::debug!("Item {} is not in the graph", id);
                    return Ok(Value::Null);
                };
                if let Some(value) = functions::item_property(&item, name) {
                    return Ok(value);
                }
                if let Some(value) = item.property(name) {
                    return Ok(value.clone());
                }
                // Fall back to the first edge of that name.
                Ok(self
                    .graph
                    .edges(*id, name)
                    .first()
                    .map(|edge| Value::Item(edge.target))
                    .unwrap_or(Value::Null))
            }
            Value::Dict(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Value::List(items) => match name {
                "count" => Ok(Value::Number(items.len() as f64)),
                "first" => Ok(items.first().cloned().unwrap_or(Value::Null)),
                "last" => Ok(items.last().cloned().unwrap_or(Value::Null)),
                _ => Err(EvalError::InvalidPropertyAccess {
                    property: name.to_string(),
                    type_name: target.type_name(),
                }),
            },
            Value::String(s) if name == "count" || name == "length" => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            other => Err(EvalError::InvalidPropertyAccess {
                property: name.to_string(),
                type_name: other.type_name(),
            }),
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &ExprNode, rhs: &ExprNode, args: &ViewArguments) -> EvalResult<Value> {
        // Short-circuit before evaluating the right-hand side.
        match op {
            BinaryOp::And => {
                if !self.eval(lhs, args)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval(rhs, args)?.is_truthy()));
            }
            BinaryOp::Or => {
                if self.eval(lhs, args)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval(rhs, args)?.is_truthy()));
            }
            _ => {}
        }

        let left = self.eval(lhs, args)?;
        let right = self.eval(rhs, args)?;
        let mismatch = |left: &Value, right: &Value| EvalError::TypeMismatch {
            op: op.to_string(),
            left: left.type_name(),
            right: right.type_name(),
        };

        match op {
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::Ne => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                }
                .ok_or_else(|| mismatch(&left, &right))?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
                (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!(
                    "{}{}",
                    left.to_display_string(),
                    right.to_display_string()
                ))),
                _ => Err(mismatch(&left, &right)),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                    return Err(mismatch(&left, &right));
                };
                match op {
                    BinaryOp::Sub => Ok(Value::Number(a - b)),
                    BinaryOp::Mul => Ok(Value::Number(a * b)),
                    _ if *b == 0.0 => Err(EvalError::DivisionByZero),
                    _ => Ok(Value::Number(a / b)),
                }
            }
            // Both sides are already evaluated here.
            BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
            BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::DefaultHost;
    use crate::core::graph::InMemoryGraph;
    use crate::models::ItemId;
    use std::collections::BTreeMap;

    struct Fixture {
        graph: InMemoryGraph,
        host: DefaultHost,
        note: ItemId,
    }

    fn fixture() -> Fixture {
        let graph = InMemoryGraph::new();
        let note = graph.create_item(
            "Note",
            BTreeMap::from([
                ("title".to_string(), Value::from("hello")),
                ("stars".to_string(), Value::Number(3.0)),
            ]),
        );
        let label = graph.create_item("Label", BTreeMap::from([("name".to_string(), Value::from("work"))]));
        graph.link(note, label, "labels").unwrap();
        Fixture {
            graph,
            host: DefaultHost::new().with_global("appName", Value::from("Memo")),
            note,
        }
    }

    fn eval(f: &Fixture, source: &str) -> EvalResult<Value> {
        let interpolator = Interpolator::new(&f.host, &f.graph);
        let args = ViewArguments::new().with_item(f.note).with_value("limit", 2.0);
        interpolator.evaluate(&Expression::bare(source).unwrap(), &args)
    }

    #[test]
    fn test_current_item_property() {
        let f = fixture();
        assert_eq!(eval(&f, ".title"), Ok(Value::from("hello")));
    }

    #[test]
    fn test_edge_fallback_and_chaining() {
        let f = fixture();
        assert_eq!(eval(&f, ".labels.name"), Ok(Value::from("work")));
        assert_eq!(eval(&f, ".missing.name"), Ok(Value::Null));
    }

    #[test]
    fn test_operators() {
        let f = fixture();
        assert_eq!(eval(&f, ".stars * 2 + 1"), Ok(Value::Number(7.0)));
        assert_eq!(eval(&f, ".stars > $limit AND !false"), Ok(Value::Bool(true)));
        assert_eq!(eval(&f, "'a' + .stars"), Ok(Value::from("a3")));
        assert_eq!(eval(&f, ".stars == 3 ? 'three' : 'other'"), Ok(Value::from("three")));
        assert_eq!(eval(&f, "1 / 0"), Err(EvalError::DivisionByZero));
        assert!(matches!(eval(&f, "'a' < 1"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let f = fixture();
        assert_eq!(eval(&f, "false AND unknownThing"), Ok(Value::Bool(false)));
        assert_eq!(eval(&f, "true OR unknownThing"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_host_lookup_and_unknown_names() {
        let f = fixture();
        assert_eq!(eval(&f, "appName"), Ok(Value::from("Memo")));
        assert_eq!(eval(&f, "$nothing"), Err(EvalError::UnknownVariable("nothing".into())));
        assert_eq!(eval(&f, "nope()"), Err(EvalError::UnknownFunction("nope".into())));
    }

    #[test]
    fn test_bare_identifier_argument_becomes_string() {
        let f = fixture();
        assert_eq!(eval(&f, "lowercased(Hello)"), Ok(Value::from("hello")));
        assert_eq!(eval(&f, ".title.uppercased()"), Ok(Value::from("HELLO")));
    }

    #[test]
    fn test_interpolated_expression() {
        let f = fixture();
        let interpolator = Interpolator::new(&f.host, &f.graph);
        let args = ViewArguments::new().with_item(f.note);
        let expr = Expression::interpolated("{.title} has {.stars} stars").unwrap();
        assert_eq!(interpolator.evaluate(&expr, &args), Ok(Value::from("hello has 3 stars")));
    }

    #[test]
    fn test_no_current_item() {
        let f = fixture();
        let interpolator = Interpolator::new(&f.host, &f.graph);
        let expr = Expression::bare(".title").unwrap();
        assert_eq!(
            interpolator.evaluate(&expr, &ViewArguments::new()),
            Err(EvalError::NoCurrentItem)
        );
    }

    #[test]
    fn test_circular_arguments_are_detected() {
        // --- Setup ---
        let f = fixture();
        let diagnostics = Diagnostics::new(10);
        let interpolator = Interpolator::new(&f.host, &f.graph).with_diagnostics(&diagnostics);
        let args = ViewArguments::new()
            .with_definition("a", DefinitionValue::Expression(Expression::bare("$b").unwrap()))
            .with_definition("b", DefinitionValue::Expression(Expression::bare("$a").unwrap()));

        // --- Execute ---
        let result = interpolator.evaluate(&Expression::bare("$a").unwrap(), &args);
        let logged = interpolator.evaluate_or_log(&Expression::bare("$a").unwrap(), &args);

        // --- Assert ---
        assert_eq!(result, Err(EvalError::CircularReference("a".into())));
        assert_eq!(logged, Value::Null);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_evaluate_as_typed() {
        let f = fixture();
        let interpolator = Interpolator::new(&f.host, &f.graph);
        let args = ViewArguments::new().with_item(f.note);
        let stars: Option<f64> = interpolator.evaluate_as(&Expression::bare(".stars").unwrap(), &args);
        let wrong: Option<bool> = interpolator.evaluate_as(&Expression::bare(".stars").unwrap(), &args);
        assert_eq!(stars, Some(3.0));
        assert_eq!(wrong, None);
    }
}
