// src/core/mod.rs

/// Parsed render descriptions shared across views.
pub mod cache;
pub mod cascade;
pub mod catalog;
/// The `[datasource]` cascade.
pub mod datasource;
/// Recoverable problems found while resolving views.
pub mod diagnostics;
pub mod expression;
/// Built-in expression functions and the default host.
pub mod functions;
pub mod graph;
/// Expression evaluation.
pub mod interpolator;
/// Tokens of CVU text.
pub mod lexer;
pub mod parser;
/// Canonical CVU output.
pub mod printer;
/// Datasource query strings and result sets.
pub mod query;
pub mod render_config;
pub mod scheduler;
pub mod session;
/// The `[view]` cascade.
pub mod view;
/// Arguments a view is opened with.
pub mod view_arguments;
