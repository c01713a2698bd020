// src/cli/dispatcher.rs

use anyhow::{Result, bail};
use colored::*;

use crate::cli::{Cli, handlers};

/// A CLI command, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    summary: &'static str,
    handler: fn(Vec<String>) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "fmt",
        aliases: &["format"],
        summary: "Print a file's definitions in canonical form",
        handler: handlers::fmt::handle,
    },
    CommandDefinition {
        name: "inspect",
        aliases: &["show"],
        summary: "Resolve a view from a catalog directory and print it as JSON",
        handler: handlers::inspect::handle,
    },
    CommandDefinition {
        name: "validate",
        aliases: &["check"],
        summary: "Strictly validate definition files or directories",
        handler: handlers::validate::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn print_usage() {
    println!("{} cvu <command> [args...]\n", "Usage:".yellow().bold());
    println!("{}", "Commands:".yellow().bold());
    for cmd in COMMAND_REGISTRY {
        println!("  {:<10} {}", cmd.name.cyan(), cmd.summary);
    }
}

/// Routes the parsed command line to its handler.
pub fn run(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(name) = cli.command else {
        print_usage();
        return Ok(());
    };

    match find_command(&name) {
        Some(command) => (command.handler)(cli.args),
        None => {
            print_usage();
            bail!("Unknown command '{}'", name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("fmt").map(|c| c.name), Some("fmt"));
        assert_eq!(find_command("format").map(|c| c.name), Some("fmt"));
        assert_eq!(find_command("check").map(|c| c.name), Some("validate"));
        assert!(find_command("run").is_none());
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let cli = Cli {
            command: Some("bogus".to_string()),
            args: Vec::new(),
        };
        assert!(run(cli).is_err());
    }
}
