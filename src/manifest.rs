//! # Bundle Manifest
//!
//! This module locates and parses the `bundle.yml` manifest that declares the
//! set of projects to synchronize. It is the only place where raw YAML is
//! touched; everything downstream works with the typed [`Bundle`] and
//! [`ProjectSpec`] records.
//!
//! ## Format
//!
//! ```yaml
//! name: my-bundle
//! version: 1.0.0
//! projects:
//!   - project1:
//!       git: ${BITBUCKET}/user/project1
//!       version: 0.0.1
//!       remote: ec-user
//!       submodules: true
//!   - project2:
//!       git: https://github.com/user/project2.git
//!       version: develop
//!       optional: true
//!   - tools:
//!       dir: /opt/shared/tools
//! ```
//!
//! Keys that only matter to build-script generation (`cmake`, `require`, ...)
//! are accepted and ignored.
//!
//! ## Environment
//!
//! Two environment mechanisms apply while loading:
//!
//! - `$VAR` and `${VAR}` inside string values are expanded. Unknown variables
//!   are kept verbatim so that host placeholders such as `${BITBUCKET}` can be
//!   resolved later by the planner.
//! - Per-project overrides: `<BUNDLE>_<PROJECT>_VERSION`, `<BUNDLE>_<PROJECT>_GIT`
//!   and `<BUNDLE>_<PROJECT>_DIR` replace the matching field, and a non-empty
//!   `<BUNDLE>_SKIP_<PROJECT>` drops the project altogether. Names are
//!   upper-cased with `-` replaced by `_`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// File name looked up when `--bundle` points at a directory.
pub const BUNDLE_FILE_NAME: &str = "bundle.yml";

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static pattern")
});

/// A single project declared in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    /// Unique name; also the directory name under the source directory.
    pub name: String,
    /// Source URL. Mutually exclusive with `dir`.
    pub git: Option<String>,
    /// Target ref: a branch, tag or commit.
    pub version: Option<String>,
    /// Remote name to use in the working directory, if declared.
    pub remote: Option<String>,
    /// Initialise submodules recursively after each sync.
    pub submodules: bool,
    /// Failures of this project do not fail the run.
    pub optional: bool,
    /// Existing directory to symlink instead of cloning.
    pub dir: Option<PathBuf>,
}

/// A parsed bundle manifest.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub version: String,
    pub projects: Vec<ProjectSpec>,
    /// Where the manifest was read from, when it came from disk.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawBundle {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    version: Option<String>,
    #[serde(default)]
    projects: Vec<BTreeMap<String, Option<RawProject>>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProject {
    #[serde(default)]
    git: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    version: Option<String>,
    #[serde(default)]
    remote: Option<String>,
    #[serde(default)]
    submodules: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    dir: Option<String>,
}

/// Accepts `0.0.1`, `develop`, `2` and `1.5` alike; YAML types versions as
/// numbers whenever it can.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml::Value;

    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar version, found {:?}",
            other
        ))),
    }
}

/// Parse a manifest without consulting the environment.
pub fn parse(yaml_content: &str) -> Result<Bundle> {
    parse_with_env(yaml_content, &|_| None)
}

/// Parse a manifest, expanding variables and applying overrides from `env`.
pub fn parse_with_env(yaml_content: &str, env: &dyn Fn(&str) -> Option<String>) -> Result<Bundle> {
    let raw: RawBundle = serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some("projects are written as '- <name>: { git: ..., version: ... }'".to_string()),
    })?;

    let mut projects = Vec::new();
    for entry in raw.projects {
        if entry.len() != 1 {
            return Err(Error::ConfigParse {
                message: format!(
                    "each project entry must hold exactly one project, found {}",
                    entry.len()
                ),
                hint: None,
            });
        }
        for (name, project) in entry {
            let project = project.unwrap_or_default();
            let expand = |v: Option<String>| v.map(|s| expand_vars(&s, env));
            projects.push(ProjectSpec {
                name,
                git: expand(project.git),
                version: expand(project.version),
                remote: expand(project.remote),
                submodules: project.submodules,
                optional: project.optional,
                dir: expand(project.dir).map(PathBuf::from),
            });
        }
    }

    let mut bundle = Bundle {
        name: raw.name.unwrap_or_else(|| "bundle".to_string()),
        version: raw.version.unwrap_or_else(|| "0.0.0".to_string()),
        projects,
        path: None,
    };
    bundle.apply_env_overrides(env);
    Ok(bundle)
}

/// Read and parse a manifest file using the process environment.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Bundle> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut bundle = parse_with_env(&content, &|key| std::env::var(key).ok())?;
    bundle.path = Some(path.to_path_buf());
    Ok(bundle)
}

/// Find the manifest to load.
///
/// An explicit file is used as is. A directory (or no argument at all) is
/// searched for `bundle.yml`, falling back to the current directory.
pub fn locate(bundle_arg: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    let mut searched = Vec::new();
    if let Some(arg) = bundle_arg {
        let arg = if arg.is_absolute() {
            arg.to_path_buf()
        } else {
            cwd.join(arg)
        };
        if arg.is_file() {
            return Ok(arg);
        }
        if !arg.is_dir() {
            return Err(Error::ConfigParse {
                message: format!(
                    "--bundle argument {} is not a valid bundle directory or file path",
                    arg.display()
                ),
                hint: None,
            });
        }
        searched.push(arg);
    }
    if !searched.iter().any(|d| d == cwd) {
        searched.push(cwd.to_path_buf());
    }

    for dir in &searched {
        let candidate = dir.join(BUNDLE_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::BundleNotFound { searched })
}

/// Expand `$VAR` and `${VAR}` from `env`, leaving unknown variables intact.
pub fn expand_vars(value: &str, env: &dyn Fn(&str) -> Option<String>) -> String {
    ENV_VAR
        .replace_all(value, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env(key).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn env_token(name: &str) -> String {
    name.replace('-', "_").to_uppercase()
}

impl Bundle {
    /// Apply `<BUNDLE>_<PROJECT>_*` overrides and `<BUNDLE>_SKIP_<PROJECT>`.
    pub fn apply_env_overrides(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        let bundle = env_token(&self.name);
        let set = |key: String| env(&key).filter(|v| !v.is_empty());

        self.projects.retain(|p| {
            let skip = set(format!("{}_SKIP_{}", bundle, env_token(&p.name))).is_some();
            if skip {
                debug!("Skipping project {} as requested by environment", p.name);
            }
            !skip
        });

        for project in &mut self.projects {
            let prefix = format!("{}_{}", bundle, env_token(&project.name));
            if let Some(version) = set(format!("{}_VERSION", prefix)) {
                project.version = Some(version);
            }
            if let Some(git) = set(format!("{}_GIT", prefix)) {
                project.git = Some(git);
            }
            if let Some(dir) = set(format!("{}_DIR", prefix)) {
                project.dir = Some(PathBuf::from(dir));
            }
        }
    }

    #[cfg(test)]
    pub fn project(&self, name: &str) -> Option<&ProjectSpec> {
        self.projects.iter().find(|p| p.name == name)
    }
}
