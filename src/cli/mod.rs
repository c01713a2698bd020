// src/cli/mod.rs

use clap::Parser;

/// Routes a command name to its handler.
pub mod dispatcher;
/// One module per command.
pub mod handlers;

/// cvu: inspect, validate and format CVU view definitions.
///
/// Usage:
///   cvu validate <paths...>
///   cvu fmt <file> [--write | --check]
///   cvu inspect <dir> [--view NAME] [--type TYPE] [--list]
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
#[command(
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
pub struct Cli {
    /// The command to run.
    pub command: Option<String>,

    /// Arguments passed through to the command.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
