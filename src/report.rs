//! # Run Summary
//!
//! Sorts per-project outcomes into the lists shown at the end of a run.
//! [`report`] only classifies; [`SyncReport::render`] turns the lists into
//! text and is the only place colour is decided.

use std::fmt::Write;
use std::path::Path;

use crate::executor::{ProjectOutcome, SyncOutcome};
use crate::output::{paint, OutputConfig};
use crate::symlink::SymlinkResult;

/// A project that ended up on disk at a known commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedProject {
    pub display_url: String,
    pub version: String,
    pub commit: String,
}

/// A project that did not end up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProject {
    pub name: String,
    pub reason: String,
}

/// Outcomes grouped for presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<SyncedProject>,
    pub symlinked: Vec<SymlinkResult>,
    pub skipped_optional: Vec<SkippedProject>,
    pub failed: Vec<SkippedProject>,
    pub failed_symlinks: Vec<SymlinkResult>,
}

/// Group outcomes and symlink results.
pub fn report(outcomes: &[ProjectOutcome], symlinks: &[SymlinkResult]) -> SyncReport {
    let mut summary = SyncReport::default();

    for project in outcomes {
        match &project.outcome {
            SyncOutcome::Cloned { commit }
            | SyncOutcome::Updated { commit }
            | SyncOutcome::Kept { commit } => summary.synced.push(SyncedProject {
                display_url: project.display_url.clone(),
                version: project.version.clone(),
                commit: commit.clone(),
            }),
            SyncOutcome::SkippedOptionalFailure { reason } => {
                summary.skipped_optional.push(SkippedProject {
                    name: project.name.clone(),
                    reason: reason.clone(),
                })
            }
            SyncOutcome::Failed { reason } => summary.failed.push(SkippedProject {
                name: project.name.clone(),
                reason: reason.clone(),
            }),
        }
    }

    for link in symlinks {
        if link.is_ok() {
            summary.symlinked.push(link.clone());
        } else {
            summary.failed_symlinks.push(link.clone());
        }
    }

    summary
}

impl SyncReport {
    /// Render the summary. The checked-out list is left out of dry runs,
    /// since nothing was checked out.
    pub fn render(&self, config: &OutputConfig, src_dir: &Path, dry_run: bool) -> String {
        let mut out = String::new();

        if !dry_run && !self.synced.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                paint(config, format!(
                    "Following projects are checked out in {}:",
                    src_dir.display()
                ))
                .bold()
            );
            for p in &self.synced {
                let _ = writeln!(
                    out,
                    "    - {} ({})  [{}]",
                    p.display_url,
                    p.version,
                    paint(config, p.commit.as_str()).dim()
                );
            }
        }

        if !self.symlinked.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                paint(config, format!(
                    "Following projects are symlinked in {}:",
                    src_dir.display()
                ))
                .bold()
            );
            for link in &self.symlinked {
                let _ = writeln!(out, "    - {} ({})", link.name, link.target);
            }
        }

        if !self.skipped_optional.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                paint(config, "Following projects failed to download but are marked optional:")
                    .yellow()
            );
            for p in &self.skipped_optional {
                let _ = writeln!(out, "    - {}", p.name);
            }
        }

        let failed: Vec<&str> = self
            .failed
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.failed_symlinks.iter().map(|l| l.name.as_str()))
            .collect();
        if !failed.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                paint(config, "Following projects are skipped due to errors encountered:").red()
            );
            for name in failed {
                let _ = writeln!(out, "    - {}", name);
            }
        }

        out
    }
}
