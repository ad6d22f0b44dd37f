//! # Remote Identity
//!
//! Decides which remote name a project's URL lives under inside its working
//! directory. The first matching rule wins:
//!
//! 1. A remote name declared in the manifest.
//! 2. `origin`, when the working directory does not exist yet.
//! 3. An existing remote whose fetch URL equals the project URL.
//! 4. An alias derived from a hash of the URL.
//!
//! Rule 4 keeps two different URLs from ever being pushed onto the same
//! conventional name, and gives one URL the same name on every run no matter
//! which projects ran before it.

use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::git::GitClient;
use crate::planner::SyncIntent;

/// Remote name used for fresh clones without a declared remote.
pub const DEFAULT_REMOTE: &str = "origin";

/// Hex digits of the URL digest kept in a derived alias.
const ALIAS_HASH_LEN: usize = 16;

/// A resolved remote: the spelling shown to users and the token used in
/// git commands and ref names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub name: String,
    pub alias: String,
}

impl RemoteIdentity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: sanitize(name),
        }
    }
}

/// Resolve the remote for `intent`, whose working directory is `dir`.
pub fn resolve(intent: &SyncIntent, dir: &Path, git: &GitClient<'_>) -> Result<RemoteIdentity> {
    if let Some(declared) = &intent.declared_remote {
        return Ok(RemoteIdentity::new(declared));
    }
    if !dir.exists() {
        return Ok(RemoteIdentity::new(DEFAULT_REMOTE));
    }

    let remotes = git.remotes(dir)?;
    if let Some((name, _)) = remotes.iter().find(|(_, url)| intent.matches_url(url)) {
        debug!("{}: reusing remote {} for {}", intent.name, name, intent.url);
        return Ok(RemoteIdentity::new(name));
    }

    let alias = derive_alias(&intent.url);
    debug!("{}: no remote points at {}, using {}", intent.name, intent.url, alias);
    Ok(RemoteIdentity::new(&alias))
}

/// Deterministic remote name for a URL.
pub fn derive_alias(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex = hex::encode(digest);
    format!("remote-{}", &hex[..ALIAS_HASH_LEN])
}

/// Make a declared remote name safe to use as a remote and in ref paths.
///
/// `~` is dropped; anything outside `[A-Za-z0-9._-]` becomes `-`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '~')
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
