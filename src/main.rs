#![forbid(unsafe_code)]

//! labdesk: lab asset management CLI entry point.

use clap::Parser;
use colored::Colorize;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("{} {e}", "labdesk:".red());
        std::process::exit(e.exit_code());
    }
}
