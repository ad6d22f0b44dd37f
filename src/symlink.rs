//! Symlinked projects: `<src_dir>/<name> -> <dir>`.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, error};

use crate::error::{Error, Result};
use crate::planner::SymlinkIntent;

/// The result of materializing one symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkResult {
    pub name: String,
    pub target: String,
    pub error: Option<String>,
}

impl SymlinkResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Create the link, replacing an existing symlink at the same place.
///
/// A regular file or directory at the link location is never touched.
pub fn materialize(intent: &SymlinkIntent) -> Result<()> {
    let link = intent.link.as_path();

    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            debug!("Replacing symlink {}", link.display());
            remove_link(link)?;
        }
        Ok(_) => {
            return Err(Error::SymlinkOccupied {
                link: link.to_path_buf(),
                target: intent.target.clone(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    create_link(&intent.target, link)?;
    Ok(())
}

/// Materialize every intent, collecting failures instead of stopping.
pub fn materialize_all(intents: &[SymlinkIntent]) -> Vec<SymlinkResult> {
    intents
        .iter()
        .map(|intent| {
            let error = materialize(intent).err().map(|e| {
                error!("ERROR: {}", e);
                e.to_string()
            });
            SymlinkResult {
                name: intent.name.clone(),
                target: intent.target.display().to_string(),
                error,
            }
        })
        .collect()
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(unix)]
fn remove_link(link: &Path) -> io::Result<()> {
    fs::remove_file(link)
}

#[cfg(windows)]
fn remove_link(link: &Path) -> io::Result<()> {
    fs::remove_dir(link).or_else(|_| fs::remove_file(link))
}
