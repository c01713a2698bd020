// src/constants.rs

/// The name of the render group that addresses the whole render description.
pub const DEFAULT_GROUP: &str = "*";

/// The reserved view-argument key bound to the item currently being evaluated.
pub const CURRENT_ITEM_KEY: &str = ".";

/// The file extension of view catalog sources.
pub const CATALOG_EXTENSION: &str = "cvu";

/// The name of the settings file looked up next to a catalog.
pub const SETTINGS_FILENAME: &str = "cvu.toml";

/// The renderer used when no layer names one.
pub const DEFAULT_RENDERER: &str = "list";

/// The datasource name used by view definitions (`[datasource = pod]`).
pub const DEFAULT_DATASOURCE: &str = "pod";

/// Per-layer property that turns list merging off for that layer.
pub const MERGE_KEY: &str = "merge";

/// Properties that splice other named definitions in front of the current one.
pub const INCLUDE_KEYS: [&str; 2] = ["include", "inherit"];

/// Property holding an array-shorthand UI tree (`["VStack", {..}, [..]]`).
pub const TREE_KEY: &str = "tree";

/// Maximum nesting of `include`/`inherit` chains.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Maximum nesting of blocks, lists, dictionaries and parenthesized
/// expressions accepted by the parsers.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum nesting while evaluating expressions that refer to other expressions.
pub const MAX_RECURSION_DEPTH: u32 = 32;

/// Digest length used for content keys (16 bytes = 32 hex characters).
pub const HASH_TRUNCATE_LENGTH: usize = 16;

/// Default size of the diagnostic history.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 200;
