// src/bin/cvu.rs

use clap::Parser;
use colored::*;
use cvu::cli::{Cli, dispatcher};

/// Sets up logging, dispatches the command and reports any error.
fn main() {
    env_logger::init();

    if let Err(e) = dispatcher::run(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
