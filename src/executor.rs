//! # Project Sync State Machine
//!
//! [`SyncExecutor`] brings one working directory in line with one
//! [`SyncIntent`]. The directory is inspected first:
//!
//! - **Absent**: clone it. A shallow single-ref clone is tried when
//!   requested; if the remote or the ref does not support it, a full clone
//!   followed by a fetch and checkout of the ref is done instead.
//! - **Dirty**: stop. Local changes are never discarded.
//! - **Clean**: make sure the resolved remote exists and points at the
//!   declared URL, then move to the ref:
//!   - a local branch must track `<remote>/<ref>`; it is checked out and
//!     pulled, or fetched and hard-reset when a forced update was asked for;
//!   - tags and commits are checked out as they are;
//!   - a ref without local representation is fetched and checked out as a
//!     new tracking branch (or directly, if the fetch revealed a tag or
//!     commit).
//!
//! Submodules are initialised after every successful clone or update, and the
//! short commit id of `HEAD` is recorded for the report.
//!
//! Each directory belongs to exactly one intent, so nothing here locks.

use std::path::Path;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::git::GitClient;
use crate::planner::SyncIntent;
use crate::remote::{self, RemoteIdentity};

/// What to do with working directories that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Leave them untouched.
    #[default]
    Keep,
    /// Fetch and fast-forward / check out the declared ref.
    Update,
    /// Like `Update`, but branches are hard-reset to the remote tip,
    /// discarding local commits on that branch.
    ForcedUpdate,
}

impl UpdatePolicy {
    pub fn from_flags(update: bool, forced_update: bool) -> Self {
        if forced_update {
            UpdatePolicy::ForcedUpdate
        } else if update {
            UpdatePolicy::Update
        } else {
            UpdatePolicy::Keep
        }
    }
}

/// Observed state of a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingTreeState {
    Absent,
    Clean,
    Dirty,
}

/// Final state of one project after a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned { commit: String },
    Updated { commit: String },
    /// Already present and left as it was.
    Kept { commit: String },
    SkippedOptionalFailure { reason: String },
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_required_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

/// An outcome together with the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOutcome {
    pub name: String,
    pub display_url: String,
    pub version: String,
    pub outcome: SyncOutcome,
}

/// How a local ref name resolves inside an existing working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalRef {
    Branch,
    Tag,
    Commit,
    Missing,
}

/// Runs the per-project state machine.
pub struct SyncExecutor<'a> {
    git: GitClient<'a>,
    policy: UpdatePolicy,
    shallow: bool,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(git: GitClient<'a>, policy: UpdatePolicy, shallow: bool) -> Self {
        Self {
            git,
            policy,
            shallow,
        }
    }

    pub fn observe(&self, dir: &Path) -> Result<WorkingTreeState> {
        if !dir.exists() {
            return Ok(WorkingTreeState::Absent);
        }
        if self.git.is_dirty(dir)? {
            Ok(WorkingTreeState::Dirty)
        } else {
            Ok(WorkingTreeState::Clean)
        }
    }

    /// Sync one project, turning any error into an outcome.
    ///
    /// Errors of optional projects become `SkippedOptionalFailure`.
    pub fn sync_one(&self, intent: &SyncIntent) -> ProjectOutcome {
        let outcome = match self.sync(intent) {
            Ok(outcome) => outcome,
            Err(e) if intent.optional => {
                warn!(
                    "WARNING: Could not download or update optional project {}: {}",
                    intent.name, e
                );
                SyncOutcome::SkippedOptionalFailure {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!("ERROR: {}", e);
                error!("ERROR: Could not download or update {} ...", intent.name);
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        ProjectOutcome {
            name: intent.name.clone(),
            display_url: intent.display_url(),
            version: intent.version.clone(),
            outcome,
        }
    }

    /// Sync one project, returning `Cloned`, `Updated` or `Kept` on success.
    pub fn sync(&self, intent: &SyncIntent) -> Result<SyncOutcome> {
        let dir = intent.dir.as_path();
        let transition = match self.observe(dir)? {
            WorkingTreeState::Absent => {
                info!(
                    "Cloning project {} at version {}",
                    intent.name, intent.version
                );
                let remote = remote::resolve(intent, dir, &self.git)?;
                self.clone(intent, &remote)?;
                Transition::Cloned
            }
            _ if self.policy == UpdatePolicy::Keep => {
                debug!(
                    "{} already present at {}, not updating",
                    intent.name,
                    dir.display()
                );
                Transition::Kept
            }
            WorkingTreeState::Dirty => {
                return Err(Error::DirtyWorkingTree {
                    project: intent.name.clone(),
                    dir: dir.to_path_buf(),
                });
            }
            WorkingTreeState::Clean => {
                info!(
                    "Checkout project {} @ {}",
                    intent.display_url(),
                    intent.version
                );
                let remote = remote::resolve(intent, dir, &self.git)?;
                self.update(intent, &remote)?;
                Transition::Updated
            }
        };

        if intent.submodules {
            self.git.submodule_init(dir)?;
        }
        let commit = self.git.commit_id(dir)?;

        Ok(match transition {
            Transition::Cloned => SyncOutcome::Cloned { commit },
            Transition::Updated => SyncOutcome::Updated { commit },
            Transition::Kept => SyncOutcome::Kept { commit },
        })
    }

    fn clone(&self, intent: &SyncIntent, remote: &RemoteIdentity) -> Result<()> {
        let dir = intent.dir.as_path();
        let rev = intent.version.as_str();

        if self.shallow {
            match self
                .git
                .clone_shallow(&intent.clone_url, dir, rev, &remote.alias)
            {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    "WARNING: Shallow clone of {} at {} failed ({}).\n         Retrying with non-shallow clone",
                    intent.name, rev, e
                ),
            }
        }

        self.git.clone_full(&intent.clone_url, dir, &remote.alias)?;
        self.git.fetch(dir, &remote.alias, rev)?;
        self.git.checkout(dir, rev)
    }

    fn update(&self, intent: &SyncIntent, remote: &RemoteIdentity) -> Result<()> {
        let dir = intent.dir.as_path();
        let rev = intent.version.as_str();
        let alias = remote.alias.as_str();

        self.ensure_remote(intent, remote)?;

        match self.local_ref(dir, rev) {
            LocalRef::Branch => {
                debug!("{} is branch", rev);
                let expected = format!("{}/{}", alias, rev);
                let upstream =
                    self.git
                        .branch_upstream(dir, rev)
                        .ok_or_else(|| Error::UnresolvedUpstream {
                            branch: rev.to_string(),
                        })?;
                if upstream != expected {
                    return Err(Error::UpstreamMismatch {
                        branch: rev.to_string(),
                        upstream,
                        expected,
                    });
                }
                self.git.checkout(dir, rev)?;
                if self.policy == UpdatePolicy::ForcedUpdate {
                    self.git.fetch(dir, alias, rev)?;
                    self.git.reset_hard(dir, alias, rev)
                } else {
                    self.git.pull(dir, alias, rev)
                }
            }
            LocalRef::Tag | LocalRef::Commit => self.git.checkout(dir, rev),
            LocalRef::Missing => {
                debug!("{} is yet unknown", rev);
                self.git.fetch(dir, alias, rev)?;
                self.git.checkout_new(dir, alias, rev)
            }
        }
    }

    /// Add the remote if it is missing; refuse if the name is taken by
    /// another URL.
    fn ensure_remote(&self, intent: &SyncIntent, remote: &RemoteIdentity) -> Result<()> {
        let dir = intent.dir.as_path();
        let remotes = self.git.remotes(dir)?;

        match remotes.iter().find(|(name, _)| *name == remote.alias) {
            Some((_, url)) if intent.matches_url(url) => Ok(()),
            Some((_, url)) => Err(Error::RemoteNameConflict {
                project: intent.name.clone(),
                remote: remote.alias.clone(),
                existing_url: url.clone(),
                url: intent.url.clone(),
            }),
            None => {
                warn!(
                    "WARNING: {} is a new remote for repository {}. Be careful what you wish for! (check following lines)",
                    remote.name, intent.name
                );
                self.git.remote_add(dir, &remote.alias, &intent.url)
            }
        }
    }

    fn local_ref(&self, dir: &Path, rev: &str) -> LocalRef {
        if self.git.is_branch(dir, rev) {
            LocalRef::Branch
        } else if self.git.is_tag(dir, rev) {
            debug!("{} is tag", rev);
            LocalRef::Tag
        } else if self.git.is_commit(dir, rev) {
            debug!("{} is commit", rev);
            LocalRef::Commit
        } else {
            LocalRef::Missing
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Cloned,
    Updated,
    Kept,
}
