// src/cli/handlers/commons.rs

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::catalog::{CatalogSource, Origin, ViewCatalog};

/// Reads catalog sources from files and directories. Directories are walked
/// for `*.cvu` files; files are read as given.
pub fn read_sources(paths: &[impl AsRef<Path>], origin: Origin) -> Result<Vec<CatalogSource>> {
    let mut sources = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let found = ViewCatalog::read_dir(path, origin)
                .with_context(|| format!("Failed to read definitions under '{}'", path.display()))?;
            sources.extend(found);
        } else {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            sources.push(CatalogSource {
                name: path.display().to_string(),
                origin,
                text,
            });
        }
    }
    Ok(sources)
}
