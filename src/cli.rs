//! CLI argument parsing and command dispatch

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Bundle Sync - Download and update the git projects of a bundle
#[derive(Parser, Debug)]
#[command(name = "bundle-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone or update every project of the bundle
    Download(commands::download::DownloadArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let verbose = match &self.command {
            Commands::Download(args) => args.verbose,
        };
        init_logging(&self.log_level, verbose);

        match self.command {
            Commands::Download(args) => commands::download::execute(args, &self.color),
        }
    }
}

fn init_logging(log_level: &str, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        log_level.parse().unwrap_or(LevelFilter::Info)
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .try_init();
}
