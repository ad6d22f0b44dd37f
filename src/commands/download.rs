//! # Download Command Implementation
//!
//! Implements the `download` subcommand: locate and load the bundle
//! manifest, plan every project, sync them on the worker pool, create the
//! symlinked projects, and print the summary.
//!
//! Existing checkouts are left alone unless `--update` or `--forced-update`
//! is given. With `--dry-run` every git command is logged but only read-only
//! queries in existing directories actually run.
//!
//! The command fails (exit code 1) when any configuration error is found or
//! when at least one non-optional project could not be synced. Optional
//! projects that fail are listed in the summary but do not fail the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::{error, info};

use bundle_sync::coordinator;
use bundle_sync::executor::{SyncExecutor, UpdatePolicy};
use bundle_sync::git::{GitClient, SystemGit};
use bundle_sync::manifest;
use bundle_sync::output::OutputConfig;
use bundle_sync::planner::{self, PlanOptions};
use bundle_sync::report;
use bundle_sync::symlink::{self, SymlinkResult};

/// Clone or update all projects of a bundle
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Bundle file, or a directory containing `bundle.yml`.
    ///
    /// Defaults to the current directory.
    #[arg(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    /// Directory the projects are checked out into.
    #[arg(long, value_name = "DIR", default_value = "source")]
    pub src_dir: PathBuf,

    /// Update existing checkouts to the declared refs.
    #[arg(long)]
    pub update: bool,

    /// Update existing checkouts, hard-resetting branches to the remote tip.
    ///
    /// Local commits on those branches are discarded. Uncommitted changes
    /// still stop the project.
    #[arg(long)]
    pub forced_update: bool,

    /// Number of projects synced in parallel. 0 detects it from the
    /// machine or the batch scheduler allocation.
    #[arg(long, short = 'j', value_name = "N", default_value_t = 1)]
    pub threads: usize,

    /// Clone only the declared ref, with depth 1.
    #[arg(long)]
    pub shallow: bool,

    /// Log the git commands without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Token used for https://github.com clones.
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Disable coloured output.
    #[arg(long)]
    pub no_colour: bool,

    /// Log read-only git queries as well.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Execute the `download` command.
pub fn execute(args: DownloadArgs, color: &str) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let bundle_path = manifest::locate(args.bundle.as_deref(), &cwd)?;
    let bundle = manifest::from_file(&bundle_path)
        .with_context(|| format!("Failed to load bundle from {}", bundle_path.display()))?;

    let src_dir = planner::fullpath(&args.src_dir, &cwd);
    let threads = match args.threads {
        0 => coordinator::detect_parallelism(&|key| std::env::var(key).ok()),
        n => n,
    };

    info!(
        "Downloading bundle with {} threads for {} {}",
        threads, bundle.name, bundle.version
    );
    if args.dry_run {
        info!("Dry run: no command below is executed");
    }

    let options = PlanOptions {
        src_dir: src_dir.clone(),
        github_token: args.github_token.clone(),
    };
    let plan = planner::plan(&bundle.projects, &options).inspect_err(|e| {
        error!("ERROR: {}", e);
    })?;
    for rejected in &plan.rejected {
        error!("ERROR: {}", rejected.error);
    }

    let runner = SystemGit::new(args.dry_run);
    let git = GitClient::new(&runner, args.dry_run);
    let policy = UpdatePolicy::from_flags(args.update, args.forced_update);
    let executor = SyncExecutor::new(git, policy, args.shallow);

    let outcomes = coordinator::run(&executor, &plan.intents, threads)?;

    let mut links = if args.dry_run {
        plan.symlinks
            .iter()
            .map(|s| SymlinkResult {
                name: s.name.clone(),
                target: s.target.display().to_string(),
                error: None,
            })
            .collect()
    } else {
        symlink::materialize_all(&plan.symlinks)
    };
    links.extend(plan.rejected.iter().map(|r| SymlinkResult {
        name: r.name.clone(),
        target: String::new(),
        error: Some(r.error.to_string()),
    }));

    let summary = report::report(&outcomes, &links);
    let config = OutputConfig::from_flags(color, args.no_colour);
    print!("{}", summary.render(&config, &src_dir, args.dry_run));

    coordinator::aggregate(&outcomes, summary.failed_symlinks.len())?;
    Ok(())
}
