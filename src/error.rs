//! # Error Handling
//!
//! This module defines the centralized error type for `bundle-sync`. It uses
//! the `thiserror` library to create an `Error` enum covering every failure
//! mode of the synchronization engine, with enough context in each variant to
//! tell the user which project failed and what to do about it.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Variants fall into three groups:
//!   - Pre-flight configuration errors, raised before any git command runs
//!     (`ConfigParse`, `BundleNotFound`, `MissingField`, `DuplicateProject`,
//!     `AmbiguousUrl`, `SymlinkTargetMissing`).
//!   - Per-project sync errors, which abort a single project's state machine
//!     (`DirtyWorkingTree`, `RemoteNameConflict`, `UpstreamMismatch`,
//!     `UnresolvedUpstream`, `Classification`, `GitCommand`, `SymlinkOccupied`).
//!   - Run-level errors (`ThreadPool`, `AggregateFailure`).
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Per-project errors never escape the worker that produced them; the
//! coordinator turns them into outcomes and only the aggregate count is
//! surfaced as `AggregateFailure` once every project has finished.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for bundle-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// The bundle manifest could not be parsed or is semantically invalid.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// No bundle manifest was found in any of the searched locations.
    #[error("No bundle file could be found (searched in {})", searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    BundleNotFound { searched: Vec<PathBuf> },

    /// A project is missing a field that the sync engine requires.
    #[error("Project {project} does not define '{field}'")]
    MissingField { project: String, field: String },

    /// Two projects in the same manifest share a name.
    #[error("Project {project} is declared more than once")]
    DuplicateProject { project: String },

    /// The git URL uses a `~/` shorthand that does not name a user.
    #[error("Given git url {url} for project {project} is ambiguous as it does not specify the user")]
    AmbiguousUrl { project: String, url: String },

    /// A project declares a `dir` that does not exist and is not provided by
    /// another project.
    #[error("A directory [{}] is provided for project [{project}] but it does not exist", dir.display())]
    SymlinkTargetMissing { project: String, dir: PathBuf },

    /// A real directory already sits where a symlink should be created.
    #[error("There already exists a directory at {} that would be overwritten by a symlink to [{}]", link.display(), target.display())]
    SymlinkOccupied { link: PathBuf, target: PathBuf },

    /// The working directory has uncommitted changes.
    #[error("{project} sources are in dirty state at {}", dir.display())]
    DirtyWorkingTree { project: String, dir: PathBuf },

    /// A remote with the resolved name exists but points somewhere else.
    #[error("Repository {project} already defines a remote '{remote}' with url {existing_url}; declare a different remote name to match the requested url {url}")]
    RemoteNameConflict {
        project: String,
        remote: String,
        existing_url: String,
        url: String,
    },

    /// The local branch tracks a different upstream than the declared remote.
    #[error("Branch {branch} was already tracking {upstream} instead of {expected}; manual intervention needed")]
    UpstreamMismatch {
        branch: String,
        upstream: String,
        expected: String,
    },

    /// The local branch has no upstream configured.
    #[error("Branch \"{branch}\" has no upstream")]
    UnresolvedUpstream { branch: String },

    /// Querying the remote for the kind of a ref failed.
    #[error("Could not classify ref {r#ref} on remote {remote}: {message}")]
    Classification {
        remote: String,
        r#ref: String,
        message: String,
    },

    /// A git command exited unsuccessfully or could not be spawned.
    #[error("Command {command} failed{}: {stderr}", dir.as_ref().map(|d| format!(" in directory {}", d.display())).unwrap_or_default())]
    GitCommand {
        command: String,
        dir: Option<PathBuf>,
        stderr: String,
    },

    /// The worker pool could not be created.
    #[error("Could not start worker pool: {message}")]
    ThreadPool { message: String },

    /// One or more required projects failed to sync.
    #[error("Download failed with {count} errors")]
    AggregateFailure { count: usize },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
