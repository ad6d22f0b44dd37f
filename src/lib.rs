//! # Bundle Sync Library
//!
//! Brings a set of git working directories in line with a bundle manifest:
//! every project listed in `bundle.yml` is cloned or updated to its declared
//! ref, in parallel, and the run ends with a summary of what was checked out,
//! symlinked, skipped or failed. The `bundle-sync` binary is a thin wrapper
//! around this crate.
//!
//! ## Quick Example
//!
//! ```
//! use bundle_sync::manifest;
//! use bundle_sync::planner::{self, PlanOptions};
//!
//! let bundle = manifest::parse(
//!     r#"
//! name: my-bundle
//! projects:
//!   - ecbuild:
//!       git: https://github.com/ecmwf/ecbuild
//!       version: develop
//! "#,
//! )
//! .unwrap();
//!
//! let options = PlanOptions {
//!     src_dir: "/tmp/source".into(),
//!     github_token: None,
//! };
//! let plan = planner::plan(&bundle.projects, &options).unwrap();
//! assert_eq!(plan.intents[0].display_url(), "github.com:ecmwf/ecbuild");
//! ```
//!
//! ## Core Concepts
//!
//! - **Manifest (`manifest`)**: the `bundle.yml` schema, variable expansion
//!   and `<BUNDLE>_<PROJECT>_*` environment overrides.
//! - **Planning (`planner`)**: validates projects and turns them into
//!   immutable sync and symlink intents.
//! - **Git (`git`)**: command construction, the process runner seam, and the
//!   remote ref classifier.
//! - **Remotes (`remote`)**: which remote name a project's URL lives under.
//! - **Execution (`executor`)**: the per-project clone/update state machine.
//! - **Coordination (`coordinator`)**: the bounded worker pool and the
//!   aggregate verdict.
//! - **Reporting (`report`, `symlink`, `output`)**: symlinked projects and the
//!   final summary.
//!
//! ## Execution Flow
//!
//! 1.  **Manifest**: locate and parse `bundle.yml`, apply overrides.
//! 2.  **Plan**: build one intent per project; configuration errors stop here.
//! 3.  **Sync**: run the executor for every intent on the worker pool.
//! 4.  **Symlinks**: create links for `dir:` projects.
//! 5.  **Report**: print the summary and fail if any required project failed.

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod git;
pub mod manifest;
pub mod output;
pub mod planner;
pub mod remote;
pub mod report;
pub mod symlink;

#[cfg(test)]
mod remote_proptest;
