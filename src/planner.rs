//! # Sync Planning
//!
//! Turns the manifest's [`ProjectSpec`]s into immutable sync intents before
//! any git command runs. All configuration mistakes that can be detected
//! without touching a repository are reported here: missing fields, duplicate
//! names, ambiguous `~/` URLs.
//!
//! A project with a `dir` is not cloned at all. It becomes a
//! [`SymlinkIntent`] when its directory exists, or when it points into
//! another project of the same bundle (which will exist once that project has
//! been synced).

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::manifest::ProjectSpec;

/// What `${BITBUCKET}` stands for when the environment does not say.
pub const BITBUCKET_URL: &str = "ssh://git@git.ecmwf.int";

/// Host placeholders understood in git URLs.
const HOST_PLACEHOLDERS: &[(&str, &str)] = &[("${BITBUCKET}", BITBUCKET_URL)];

static KNOWN_HOSTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"git\.ecmwf\.int(?::7999/|/scm/|[:/])(.+)/([^/]+?)(?:\.git)?/?$",
            "git.ecmwf.int",
        ),
        (r"github\.com[:/](.+)/([^/]+?)(?:\.git)?/?$", "github.com"),
    ]
    .into_iter()
    .map(|(pattern, host)| (Regex::new(pattern).expect("static pattern"), host))
    .collect()
});

/// Inputs to planning that do not come from the manifest.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Directory holding one working directory per project.
    pub src_dir: PathBuf,
    /// Token injected into `https://github.com/...` clone URLs.
    pub github_token: Option<String>,
}

/// Everything needed to bring one working directory in line with the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIntent {
    pub name: String,
    /// Normalized URL; the identity remotes are matched against.
    pub url: String,
    /// URL handed to `git clone`; may carry credentials.
    pub clone_url: String,
    /// Target branch, tag or commit.
    pub version: String,
    pub declared_remote: Option<String>,
    pub optional: bool,
    pub submodules: bool,
    /// `<src_dir>/<name>`.
    pub dir: PathBuf,
}

impl SyncIntent {
    /// Whether a configured remote URL refers to this project.
    pub fn matches_url(&self, url: &str) -> bool {
        url == self.url || url == self.clone_url
    }

    /// Short `host:owner/repo` form for reports.
    pub fn display_url(&self) -> String {
        display_url(&self.url)
    }
}

/// A project materialized as `<src_dir>/<name> -> target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkIntent {
    pub name: String,
    pub target: PathBuf,
    pub link: PathBuf,
}

/// A project that could not be planned but does not stop the others.
#[derive(Debug)]
pub struct Rejected {
    pub name: String,
    pub error: Error,
}

/// The complete set of work derived from a manifest.
#[derive(Debug, Default)]
pub struct Plan {
    pub intents: Vec<SyncIntent>,
    pub symlinks: Vec<SymlinkIntent>,
    pub rejected: Vec<Rejected>,
}

/// Build the plan for `projects`.
///
/// Fails on the first fatal configuration error.
pub fn plan(projects: &[ProjectSpec], options: &PlanOptions) -> Result<Plan> {
    let mut seen = HashSet::new();
    for project in projects {
        if !seen.insert(project.name.as_str()) {
            return Err(Error::DuplicateProject {
                project: project.name.clone(),
            });
        }
    }

    // Cloned projects exist once syncing is done; symlinked ones only count
    // after they have been accepted.
    let mut available: HashSet<&str> = projects
        .iter()
        .filter(|p| p.dir.is_none())
        .map(|p| p.name.as_str())
        .collect();

    let mut plan = Plan::default();
    for project in projects {
        match &project.dir {
            Some(dir) => {
                if provides_dir(dir, &project.name, &available, &options.src_dir) {
                    available.insert(project.name.as_str());
                    plan.symlinks.push(SymlinkIntent {
                        name: project.name.clone(),
                        target: dir.clone(),
                        link: options.src_dir.join(&project.name),
                    });
                } else {
                    plan.rejected.push(Rejected {
                        name: project.name.clone(),
                        error: Error::SymlinkTargetMissing {
                            project: project.name.clone(),
                            dir: dir.clone(),
                        },
                    });
                }
            }
            None => plan.intents.push(intent_for(project, options)?),
        }
    }
    Ok(plan)
}

fn intent_for(project: &ProjectSpec, options: &PlanOptions) -> Result<SyncIntent> {
    let missing = |field: &str| Error::MissingField {
        project: project.name.clone(),
        field: field.to_string(),
    };
    let raw_url = project.git.as_deref().ok_or_else(|| missing("git"))?;
    let version = project
        .version
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing("version"))?;

    let url = normalize_url(&project.name, raw_url)?;
    let clone_url = with_token(&url, options.github_token.as_deref());

    Ok(SyncIntent {
        name: project.name.clone(),
        clone_url,
        url,
        version: version.to_string(),
        declared_remote: project.remote.clone(),
        optional: project.optional,
        submodules: project.submodules,
        dir: options.src_dir.join(&project.name),
    })
}

/// Expand host placeholders and `~user` shorthands.
///
/// `~/...` is rejected: it does not say whose home directory is meant, and
/// the answer differs between the machine that wrote the manifest and the one
/// running it.
pub fn normalize_url(project: &str, url: &str) -> Result<String> {
    let mut url = url.to_string();
    for (placeholder, value) in HOST_PLACEHOLDERS {
        url = url.replace(placeholder, value);
    }

    if url == "~" || url.starts_with("~/") {
        return Err(Error::AmbiguousUrl {
            project: project.to_string(),
            url,
        });
    }
    if let Some(rest) = url.strip_prefix('~') {
        if let Some(homes) = dirs::home_dir().and_then(|h| h.parent().map(Path::to_path_buf)) {
            return Ok(homes.join(rest).to_string_lossy().into_owned());
        }
    }
    Ok(url)
}

fn with_token(url: &str, token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(token) if url.starts_with("https://") && display_url(url).starts_with("github.com") => {
            url.replacen("https://", &format!("https://{}@", token), 1)
        }
        _ => url.to_string(),
    }
}

/// Shorten URLs of known hosts to `host:owner/repo`; others are returned as is.
pub fn display_url(url: &str) -> String {
    KNOWN_HOSTS
        .iter()
        .find_map(|(pattern, host)| {
            pattern
                .captures(url)
                .map(|caps| format!("{}:{}/{}", host, &caps[1], &caps[2]))
        })
        .unwrap_or_else(|| url.to_string())
}

/// Whether `dir` will exist by the time symlinks are created.
///
/// A relative `dir` may point into an `available` project, never into the
/// project being linked.
fn provides_dir(dir: &Path, name: &str, available: &HashSet<&str>, src_dir: &Path) -> bool {
    let first = match dir.components().next() {
        Some(Component::Normal(first)) => first.to_str(),
        _ => None,
    };
    if first == Some(name) {
        return false;
    }
    if dir.exists() || (dir.is_relative() && src_dir.join(dir).exists()) {
        return true;
    }
    first.is_some_and(|first| available.contains(first))
}

/// Absolute form of a user-supplied path, expanding a leading `~`.
pub fn fullpath(path: &Path, cwd: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    }
}
