// src/cli/handlers/inspect.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::SETTINGS_FILENAME;
use crate::core::catalog::ViewRequest;
use crate::core::graph::InMemoryGraph;
use crate::core::view_arguments::ViewArguments;
use crate::settings::Settings;
use crate::state::{AppContext, ViewStates};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Resolves a view from a catalog directory and prints it as JSON."
)]
struct InspectArgs {
    /// Directory of default definitions. A `cvu.toml` inside it is used as settings.
    dir: PathBuf,

    /// Named view (`.name`) to layer on top.
    #[arg(long)]
    view: Option<String>,

    /// Item type whose type view is used.
    #[arg(long = "type")]
    item_type: Option<String>,

    /// Use the list form of the type view (`Type[]`).
    #[arg(long)]
    list: bool,
}

/// Loads a catalog directory and prints a resolved view.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = InspectArgs::try_parse_from(&args)?;
    let mut stdout = std::io::stdout().lock();
    inspect(&args, &mut stdout)
}

fn inspect(args: &InspectArgs, out: &mut dyn Write) -> Result<()> {
    let settings = Settings::load_or_default(&args.dir.join(SETTINGS_FILENAME))?;
    let context = AppContext::load(settings, Some(&args.dir), Arc::new(InMemoryGraph::new()))?;

    let request = ViewRequest {
        named: args.view.clone(),
        item_type: args.item_type.clone(),
        list: args.list,
    };
    let resolved = context
        .resolve_view(&request, &ViewStates::default(), &ViewArguments::new())
        .with_context(|| format!("Failed to resolve view {:?}", request))?;

    let report = serde_json::json!({
        "view": resolved.effective().to_json(),
        "renderConfig": resolved.render_config().snapshot().to_json(),
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;

    for issue in context.catalog().issues() {
        log::warn!("{}", issue);
    }
    for diagnostic in context.diagnostics().entries() {
        eprintln!("{} {}", "warning:".yellow().bold(), diagnostic);
    }
    Ok(())
}
