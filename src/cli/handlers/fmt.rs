// src/cli/handlers/fmt.rs

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use crate::core::{parser, printer};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Prints a CVU file in canonical form.")]
struct FmtArgs {
    /// The file to format.
    file: PathBuf,

    /// Rewrite the file in place instead of printing it.
    #[arg(long, short)]
    write: bool,

    /// Exit with an error if the file is not already formatted.
    #[arg(long, conflicts_with = "write")]
    check: bool,
}

/// Prints or rewrites a file in canonical form.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = FmtArgs::try_parse_from(&args)?;
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read '{}'", args.file.display()))?;
    let formatted = format_source(&text)?;

    if args.check {
        if formatted != text {
            bail!("'{}' is not formatted", args.file.display());
        }
        return Ok(());
    }
    if args.write {
        fs::write(&args.file, &formatted)
            .with_context(|| format!("Failed to write '{}'", args.file.display()))?;
        log::info!("Formatted '{}'", args.file.display());
        return Ok(());
    }
    print!("{}", formatted);
    Ok(())
}

/// Parses every definition and prints them back. Refuses to format text that
/// does not parse, since broken blocks would be dropped.
fn format_source(text: &str) -> Result<String> {
    let mut definitions = Vec::new();
    for result in parser::parse_definitions(text) {
        definitions.push(result.context("Cannot format a file with parse errors")?);
    }
    Ok(printer::definitions_to_cvu_string(&definitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_is_stable() {
        let once = format_source("Note{title:\"x\",starred:true}\n[view]{ }").unwrap();
        let twice = format_source(&once).unwrap();
        assert_eq!(once, twice);
        assert!(once.starts_with("Note {\n"));
    }

    #[test]
    fn test_format_refuses_broken_input() {
        let err = format_source("Note { title: }").unwrap_err();
        assert!(err.to_string().contains("parse errors"));
    }

    #[test]
    fn test_write_then_check() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.cvu");
        fs::write(&path, "Note{title:\"x\"}").unwrap();
        let path_arg = path.display().to_string();

        // --- Execute & Assert ---
        assert!(handle(vec![path_arg.clone(), "--check".into()]).is_err());
        handle(vec![path_arg.clone(), "--write".into()]).unwrap();
        assert!(handle(vec![path_arg, "--check".into()]).is_ok());
    }
}
