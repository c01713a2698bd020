// src/core/catalog.rs

//! The view catalog: every parsed definition known to the application, and
//! the construction of cascade stacks out of them.
//!
//! Each definition is an independent unit. A broken definition is reported as
//! a [`CatalogIssue`] and left out, unless the catalog is loaded in
//! [`LoadMode::Strict`], where any issue fails the whole load.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

use crate::constants::{CATALOG_EXTENSION, DEFAULT_DATASOURCE, MAX_INCLUDE_DEPTH};
use crate::core::cascade::CascadeStack;
use crate::core::parser::{self, ParseError};
use crate::models::{Domain, ParsedDefinition, Selector};

/// Failures while loading or expanding a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A catalog file could not be read.
    #[error("Failed to read catalog file '{path}': {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A strict load found broken definitions.
    #[error("Catalog validation failed with {count} issue(s); first: {first}")]
    Validation { count: usize, first: String },

    /// An `include` chain leads back to itself.
    #[error("Include cycle detected: {}", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    /// An `include` chain is longer than the limit.
    #[error("Include depth limit ({limit}) exceeded while expanding '{name}'")]
    IncludeDepth { name: String, limit: usize },

    /// A catalog directory could not be traversed.
    #[error("Failed to walk catalog directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Where a definition comes from. User definitions are more specific than
/// shipped defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    /// Definitions shipped with the application.
    Default,
    /// Definitions written by the user.
    User,
}

/// How a load treats broken definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Broken definitions are skipped and reported.
    Lenient,
    /// Any broken definition fails the load.
    Strict,
}

/// One unit of catalog text, typically a file.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    /// Display name, usually the file path.
    pub name: String,
    /// Whether the text ships with the application.
    pub origin: Origin,
    /// CVU text.
    pub text: String,
}

impl CatalogSource {
    /// A source named `name`.
    pub fn new(name: &str, origin: Origin, text: &str) -> Self {
        Self {
            name: name.to_string(),
            origin,
            text: text.to_string(),
        }
    }
}

/// A definition that failed to parse, with the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIssue {
    /// Name of the source that failed.
    pub source: String,
    /// The first parse error in the definition.
    pub error: ParseError,
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// A parsed top-level definition and where it came from.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// The definition, shared with every stack built from it.
    pub definition: Arc<ParsedDefinition>,
    /// Origin of the source it was parsed from.
    pub origin: Origin,
    /// Name of the [`CatalogSource`] it was parsed from.
    pub source: String,
}

/// Which view to build a stack for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewRequest {
    /// `.name` selector to match.
    pub named: Option<String>,
    /// Type selector to match.
    pub item_type: Option<String>,
    /// Match `Type[]` rather than `Type`.
    pub list: bool,
}

impl ViewRequest {
    /// Requests the `.name` view.
    pub fn named(name: &str) -> Self {
        Self {
            named: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Requests the view of an item type, as a list or single item.
    pub fn for_type(item_type: &str, list: bool) -> Self {
        Self {
            item_type: Some(item_type.to_string()),
            list,
            ..Self::default()
        }
    }

    /// Adds a named view on top of the type view.
    pub fn with_name(mut self, name: &str) -> Self {
        self.named = Some(name.to_string());
        self
    }
}

/// Every known definition, ordered by [`Origin`].
#[derive(Debug, Clone, Default)]
pub struct ViewCatalog {
    entries: Vec<CatalogEntry>,
    issues: Vec<CatalogIssue>,
}

impl ViewCatalog {
    /// A catalog with no definitions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses every source in parallel. Entries keep source order within an
    /// origin, with all defaults ahead of user definitions.
    pub fn from_sources(sources: Vec<CatalogSource>, mode: LoadMode) -> CatalogResult<Self> {
        let parsed: Vec<(CatalogSource, Vec<Result<ParsedDefinition, ParseError>>)> = sources
            .into_par_iter()
            .map(|source| {
                let results = parser::parse_definitions(&source.text);
                (source, results)
            })
            .collect();

        let mut catalog = Self::default();
        for (source, results) in parsed {
            for result in results {
                match result {
                    Ok(definition) => catalog.entries.push(CatalogEntry {
                        definition: Arc::new(definition),
                        origin: source.origin,
                        source: source.name.clone(),
                    }),
                    Err(error) => {
                        warn!("Skipping invalid definition in '{}': {}", source.name, error);
                        catalog.issues.push(CatalogIssue {
                            source: source.name.clone(),
                            error,
                        });
                    }
                }
            }
        }
        catalog.entries.sort_by_key(|entry| entry.origin);

        if mode == LoadMode::Strict {
            if let Some(first) = catalog.issues.first() {
                return Err(CatalogError::Validation {
                    count: catalog.issues.len(),
                    first: first.to_string(),
                });
            }
        }
        info!(
            "Loaded {} definition(s) with {} issue(s)",
            catalog.entries.len(),
            catalog.issues.len()
        );
        Ok(catalog)
    }

    /// Reads every `*.cvu` file under `dir`, in path order.
    pub fn read_dir(dir: &Path, origin: Origin) -> CatalogResult<Vec<CatalogSource>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            let is_cvu = entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some(CATALOG_EXTENSION);
            if is_cvu {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let text = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(CatalogSource {
                    name: path.display().to_string(),
                    origin,
                    text,
                })
            })
            .collect()
    }

    /// Reads every `.cvu` file under `dir`.
    pub fn load_dir(dir: &Path, origin: Origin, mode: LoadMode) -> CatalogResult<Self> {
        Self::from_sources(Self::read_dir(dir, origin)?, mode)
    }

    /// Combines two catalogs, keeping the origin ordering.
    pub fn merged(mut self, other: ViewCatalog) -> Self {
        self.entries.extend(other.entries);
        self.issues.extend(other.issues);
        self.entries.sort_by_key(|entry| entry.origin);
        self
    }

    /// Entries, defaults before user definitions.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Definitions skipped by a lenient load.
    pub fn issues(&self) -> &[CatalogIssue] {
        &self.issues
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no definition was loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definitions with exactly this selector, least specific first.
    pub fn definitions_for(&self, selector: &Selector) -> Vec<Arc<ParsedDefinition>> {
        self.entries
            .iter()
            .filter(|entry| &entry.definition.selector == selector)
            .map(|entry| Arc::clone(&entry.definition))
            .collect()
    }

    /// `definition` preceded by everything it includes, recursively.
    pub fn expand(&self, definition: &Arc<ParsedDefinition>) -> CatalogResult<Vec<Arc<ParsedDefinition>>> {
        let mut chain = Vec::new();
        if let Some(name) = named_of(definition) {
            chain.push(name.to_string());
        }
        let mut out = Vec::new();
        self.expand_into(definition, &mut chain, &mut out)?;
        Ok(out)
    }

    fn expand_into(
        &self,
        definition: &Arc<ParsedDefinition>,
        chain: &mut Vec<String>,
        out: &mut Vec<Arc<ParsedDefinition>>,
    ) -> CatalogResult<()> {
        for name in definition.includes() {
            if chain.contains(&name) {
                let mut cycle = chain.clone();
                cycle.push(name);
                return Err(CatalogError::IncludeCycle { chain: cycle });
            }
            if chain.len() >= MAX_INCLUDE_DEPTH {
                return Err(CatalogError::IncludeDepth {
                    name,
                    limit: MAX_INCLUDE_DEPTH,
                });
            }
            let targets = self.definitions_for(&Selector::named(&name));
            if targets.is_empty() {
                warn!("Include target '.{}' not found in the catalog; skipping", name);
                continue;
            }
            chain.push(name);
            for target in &targets {
                self.expand_into(target, chain, out)?;
            }
            chain.pop();
        }
        out.push(Arc::clone(definition));
        Ok(())
    }

    fn expanded_stack(&self, selectors: &[Selector]) -> CatalogResult<CascadeStack> {
        let mut stack = CascadeStack::new();
        for selector in selectors {
            for definition in self.definitions_for(selector) {
                for layer in self.expand(&definition)? {
                    stack.push(layer);
                }
            }
        }
        Ok(stack)
    }

    /// `[view]`, then the type view, then the named view.
    pub fn view_stack(&self, request: &ViewRequest) -> CatalogResult<CascadeStack> {
        let mut selectors = vec![Selector::domain(Domain::View, None)];
        if let Some(item_type) = &request.item_type {
            selectors.push(Selector::type_selector(item_type, request.list));
        }
        if let Some(named) = &request.named {
            selectors.push(Selector::named(named));
        }
        let stack = self.expanded_stack(&selectors)?;
        debug!("View stack for {:?} has {} layer(s)", request, stack.len());
        Ok(stack)
    }

    /// Top-level `[renderer = name]` definitions, then the matching blocks
    /// nested in each view layer.
    pub fn renderer_stack(&self, renderer: &str, view_stack: &CascadeStack) -> CatalogResult<CascadeStack> {
        let mut stack = self.expanded_stack(&[Selector::domain(Domain::Renderer, Some(renderer))])?;
        for layer in view_stack.layers() {
            if let Some(nested) = layer.sub_definition(Domain::Renderer, Some(renderer)) {
                stack.push(Arc::new(nested.clone()));
            }
        }
        Ok(stack)
    }

    /// Top-level `[datasource = pod]` definitions, then the datasource blocks
    /// nested in each view layer.
    pub fn datasource_stack(&self, view_stack: &CascadeStack) -> CatalogResult<CascadeStack> {
        let mut stack =
            self.expanded_stack(&[Selector::domain(Domain::Datasource, Some(DEFAULT_DATASOURCE))])?;
        for layer in view_stack.layers() {
            for nested in layer.sub_definitions(Domain::Datasource) {
                stack.push(Arc::new(nested.clone()));
            }
        }
        Ok(stack)
    }
}

fn named_of(definition: &ParsedDefinition) -> Option<&str> {
    match &definition.selector {
        Selector::Named(name) => Some(name),
        _ => None,
    }
}
