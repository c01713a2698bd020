//! CVU: a cascading view-definition engine.
//!
//! Definitions written in the CVU language are parsed into typed trees,
//! stacked from least to most specific and resolved into one effective
//! configuration per view, with inline expressions evaluated against an item
//! graph.

/// The `cvu` command line.
pub mod cli;
/// Shared names and limits.
pub mod constants;
/// Parsing, cascading and resolution.
pub mod core;
/// Runtime values, parsed definitions and graph items.
pub mod models;
/// `cvu.toml` settings.
pub mod settings;
pub mod state;
