// src/cli/handlers/mod.rs

/// Helpers shared by the handlers.
pub mod commons;
/// `cvu fmt`
pub mod fmt;
/// `cvu inspect`
pub mod inspect;
/// `cvu validate`
pub mod validate;
