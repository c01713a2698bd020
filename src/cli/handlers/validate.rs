// src/cli/handlers/validate.rs

use anyhow::{Result, bail};
use clap::Parser;
use colored::*;
use std::io::Write;
use std::path::PathBuf;

use crate::cli::handlers::commons;
use crate::core::catalog::{CatalogSource, LoadMode, Origin, ViewCatalog};
use crate::core::parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Strictly validates CVU files; any broken definition is an error."
)]
struct ValidateArgs {
    /// Files or directories to validate.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

/// Parses every definition file and reports the broken ones.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = ValidateArgs::try_parse_from(&args)?;
    let sources = commons::read_sources(&args.paths, Origin::Default)?;
    let mut stdout = std::io::stdout().lock();
    let issues = report(&sources, &mut stdout)?;
    if issues > 0 {
        bail!("Validation failed with {} issue(s)", issues);
    }
    Ok(())
}

/// Writes a per-file report and returns the number of issues found. Include
/// directives are checked once every file has parsed.
fn report(sources: &[CatalogSource], out: &mut dyn Write) -> Result<usize> {
    let mut issues = 0;

    for source in sources {
        let results = parser::parse_definitions(&source.text);
        let failed: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        if failed.is_empty() {
            writeln!(out, "{} {} ({} definitions)", "ok".green().bold(), source.name, results.len())?;
            continue;
        }
        writeln!(out, "{} {}", "error".red().bold(), source.name)?;
        for error in failed {
            writeln!(out, "    {}", error)?;
            issues += 1;
        }
    }

    if issues == 0 {
        let catalog = ViewCatalog::from_sources(sources.to_vec(), LoadMode::Strict)?;
        for entry in catalog.entries() {
            if let Err(e) = catalog.expand(&entry.definition) {
                writeln!(out, "{} {}: {}", "error".red().bold(), entry.source, e)?;
                issues += 1;
            }
        }
    }

    Ok(issues)
}
