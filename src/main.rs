//! # Bundle Sync CLI
//!
//! Binary entry point for the `bundle-sync` command-line tool.
//!
//! It parses arguments with `clap`, sets up logging, and dispatches to the
//! subcommand. All sync logic lives in the library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
