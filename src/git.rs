//! # Git Command Layer
//!
//! Everything the sync engine asks of git goes through this module. Commands
//! are built as token vectors ([`GitCommand`]) and handed to a [`GitRunner`],
//! the only seam that touches processes. [`SystemGit`] runs the real `git`
//! binary; tests substitute a recording double.
//!
//! [`GitClient`] sits on top of a runner and knows the exact command forms
//! the engine issues (clone, fetch, checkout, reset, pull, submodules) as
//! well as the read-only queries used to inspect a working directory. It also
//! hosts the ref classifier, which asks the remote what kind of ref a name
//! denotes.
//!
//! ## Dry runs
//!
//! With `dry_run` set, [`SystemGit`] logs every command but only executes
//! read-only queries, and only when their working directory already exists.
//! Remote classification is skipped entirely and reports [`RefKind::Branch`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, error, log, Level};

use crate::error::{Error, Result};

/// Token passed with `-c` to silence git's detached-HEAD advice.
const NO_DETACHED_ADVICE: &str = "advice.detachedHead=false";

/// Whether a command changes repository state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Changes the working directory or its configuration.
    Mutating,
    /// Only reads state; failures are expected answers, not errors.
    Query,
    /// Changes state, but the caller has a fallback if it fails.
    Attempt,
}

/// A git invocation as a list of tokens plus the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub kind: CommandKind,
}

impl GitCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            kind: CommandKind::Mutating,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn query(mut self) -> Self {
        self.kind = CommandKind::Query;
        self
    }

    /// Mark a mutating command whose failure the caller recovers from.
    pub fn attempt(mut self) -> Self {
        self.kind = CommandKind::Attempt;
        self
    }

    pub fn is_query(&self) -> bool {
        self.kind == CommandKind::Query
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {}", self.args.join(" "))
    }
}

/// Executes git commands and returns their standard output.
///
/// Implementations must be shareable across the worker pool.
pub trait GitRunner: Send + Sync {
    fn run(&self, command: &GitCommand) -> Result<String>;
}

/// Runs the system `git` binary.
///
/// Authentication is whatever the user's git is configured with: SSH keys,
/// credential helpers, tokens in `~/.gitconfig`.
#[derive(Debug, Clone, Default)]
pub struct SystemGit {
    dry_run: bool,
}

impl SystemGit {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn skip_in_dry_run(&self, command: &GitCommand) -> bool {
        if !self.dry_run {
            return false;
        }
        match command.kind {
            CommandKind::Mutating | CommandKind::Attempt => true,
            CommandKind::Query => command.cwd.as_ref().is_some_and(|dir| !dir.exists()),
        }
    }
}

impl GitRunner for SystemGit {
    fn run(&self, command: &GitCommand) -> Result<String> {
        let level = if command.is_query() {
            Level::Debug
        } else {
            Level::Info
        };
        if let Some(dir) = &command.cwd {
            log!(level, "+ cd {}", dir.display());
        }
        log!(level, "+ {}", command);

        if self.skip_in_dry_run(command) {
            return Ok(String::new());
        }

        let mut process = Command::new("git");
        process.args(&command.args);
        if let Some(dir) = &command.cwd {
            process.current_dir(dir);
        }
        let output = process.output().map_err(|e| {
            log_failure(command);
            Error::GitCommand {
                command: command.to_string(),
                dir: command.cwd.clone(),
                stderr: e.to_string(),
            }
        })?;

        if !output.status.success() {
            log_failure(command);
            let stderr = describe_failure(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::GitCommand {
                command: command.to_string(),
                dir: command.cwd.clone(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Failed mutations are fatal for their project; failed attempts are not.
fn log_failure(command: &GitCommand) {
    let location = command
        .cwd
        .as_ref()
        .map(|d| format!(" in directory {}", d.display()))
        .unwrap_or_default();
    match command.kind {
        CommandKind::Mutating => error!("ERROR: Command {} failed{}", command, location),
        CommandKind::Attempt => debug!("Command {} failed{}", command, location),
        CommandKind::Query => {}
    }
}

/// Adds a hint to the most common authentication failures.
fn describe_failure(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        format!(
            "{}\n  hint: make sure your SSH key is loaded or git credentials are configured for this host",
            stderr
        )
    } else {
        stderr.to_string()
    }
}

/// What a ref name denotes on a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
    PullRequest,
    /// The remote has no ref by that name (e.g. a bare commit id).
    Unknown,
}

impl RefKind {
    /// Classify from `git ls-remote <remote> <ref>` output.
    ///
    /// Heads take precedence over tags, tags over pull-request refs.
    pub fn from_ls_remote(output: &str) -> Self {
        let refs: Vec<&str> = output
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .collect();
        let under = |prefix: &str| refs.iter().any(|r| r.starts_with(prefix));

        if under("refs/heads/") {
            RefKind::Branch
        } else if under("refs/tags/") {
            RefKind::Tag
        } else if under("refs/pull/") {
            RefKind::PullRequest
        } else {
            RefKind::Unknown
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::PullRequest => "pull request",
            RefKind::Unknown => "unknown ref",
        };
        f.write_str(name)
    }
}

/// Typed git operations on top of a [`GitRunner`].
#[derive(Clone, Copy)]
pub struct GitClient<'a> {
    runner: &'a dyn GitRunner,
    dry_run: bool,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl<'a> GitClient<'a> {
    pub fn new(runner: &'a dyn GitRunner, dry_run: bool) -> Self {
        Self { runner, dry_run }
    }

    fn run(&self, command: GitCommand) -> Result<String> {
        self.runner.run(&command)
    }

    fn succeeds(&self, command: GitCommand) -> bool {
        self.run(command).is_ok()
    }

    /// `git -c advice.detachedHead=false clone -o <remote> -b <ref> <url> <dir> --depth=1`
    pub fn clone_shallow(&self, url: &str, dir: &Path, rev: &str, remote: &str) -> Result<()> {
        let dir = path_arg(dir);
        self.run(GitCommand::new([
            "-c",
            NO_DETACHED_ADVICE,
            "clone",
            "-o",
            remote,
            "-b",
            rev,
            url,
            dir.as_str(),
            "--depth=1",
        ])
        .attempt())
        .map(drop)
    }

    /// `git clone -o <remote> <url> <dir>`
    pub fn clone_full(&self, url: &str, dir: &Path, remote: &str) -> Result<()> {
        let dir = path_arg(dir);
        self.run(GitCommand::new(["clone", "-o", remote, url, dir.as_str()]))
            .map(drop)
    }

    /// Ask the remote what `rev` is. Skipped in dry runs.
    pub fn classify(&self, dir: &Path, remote: &str, rev: &str) -> Result<RefKind> {
        if self.dry_run {
            return Ok(RefKind::Branch);
        }
        let output = self
            .run(GitCommand::new(["ls-remote", remote, rev]).in_dir(dir).query())
            .map_err(|e| Error::Classification {
                remote: remote.to_string(),
                r#ref: rev.to_string(),
                message: e.to_string(),
            })?;
        Ok(RefKind::from_ls_remote(&output))
    }

    /// A shallow clone keeps its graft points in `.git/shallow`.
    pub fn is_shallow(&self, dir: &Path) -> bool {
        dir.join(".git").join("shallow").is_file()
    }

    /// Fetch `rev` from `remote`, in the form the repository's depth requires.
    pub fn fetch(&self, dir: &Path, remote: &str, rev: &str) -> Result<()> {
        let kind = self.classify(dir, remote, rev)?;
        for command in fetch_commands(self.is_shallow(dir), kind, remote, rev) {
            self.run(command.in_dir(dir))?;
        }
        Ok(())
    }

    pub fn is_dirty(&self, dir: &Path) -> Result<bool> {
        let status = self.run(GitCommand::new(["status", "--porcelain"]).in_dir(dir).query())?;
        Ok(!status.trim().is_empty())
    }

    /// Configured remotes as `(name, fetch url)` pairs.
    pub fn remotes(&self, dir: &Path) -> Result<Vec<(String, String)>> {
        let output = self.run(GitCommand::new(["remote", "-v"]).in_dir(dir).query())?;
        Ok(output
            .lines()
            .filter(|line| line.ends_with("(fetch)"))
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                Some((parts.next()?.to_string(), parts.next()?.to_string()))
            })
            .collect())
    }

    pub fn remote_add(&self, dir: &Path, remote: &str, url: &str) -> Result<()> {
        self.run(GitCommand::new(["remote", "add", remote, url]).in_dir(dir))
            .map(drop)
    }

    pub fn is_branch(&self, dir: &Path, rev: &str) -> bool {
        let full = format!("refs/heads/{}", rev);
        self.succeeds(
            GitCommand::new(["show-ref", "--verify", "--quiet", full.as_str()])
                .in_dir(dir)
                .query(),
        )
    }

    pub fn is_tag(&self, dir: &Path, rev: &str) -> bool {
        let peeled = format!("{}^{{tag}}", rev);
        self.succeeds(
            GitCommand::new(["rev-parse", "--verify", "--quiet", peeled.as_str()])
                .in_dir(dir)
                .query(),
        )
    }

    pub fn is_commit(&self, dir: &Path, rev: &str) -> bool {
        let peeled = format!("{}^{{commit}}", rev);
        self.succeeds(
            GitCommand::new(["rev-parse", "--verify", "--quiet", peeled.as_str()])
                .in_dir(dir)
                .query(),
        )
    }

    /// The `<remote>/<branch>` a local branch tracks, if any.
    pub fn branch_upstream(&self, dir: &Path, branch: &str) -> Option<String> {
        let spec = format!("{}@{{upstream}}", branch);
        self.run(
            GitCommand::new(["rev-parse", "--abbrev-ref", "--symbolic-full-name", spec.as_str()])
                .in_dir(dir)
                .query(),
        )
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    }

    /// `git -c advice.detachedHead=false checkout <ref>`
    pub fn checkout(&self, dir: &Path, rev: &str) -> Result<()> {
        self.run(GitCommand::new(["-c", NO_DETACHED_ADVICE, "checkout", rev]).in_dir(dir))
            .map(drop)
    }

    /// Check out a ref that had no local representation before the fetch.
    ///
    /// Tags and commits are checked out directly; anything else becomes a new
    /// local branch tracking `<remote>/<ref>`.
    pub fn checkout_new(&self, dir: &Path, remote: &str, rev: &str) -> Result<()> {
        if self.is_tag(dir, rev) {
            debug!("{} is tag", rev);
            return self.checkout(dir, rev);
        }
        if self.is_commit(dir, rev) {
            debug!("{} is commit", rev);
            return self.checkout(dir, rev);
        }
        let upstream = format!("{}/{}", remote, rev);
        self.run(GitCommand::new(["checkout", "-b", rev, upstream.as_str()]).in_dir(dir))
            .map(drop)
    }

    /// `git reset --hard <remote>/<ref>`
    pub fn reset_hard(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let target = format!("{}/{}", remote, branch);
        self.run(GitCommand::new(["reset", "--hard", target.as_str()]).in_dir(dir))
            .map(drop)
    }

    /// `git pull <remote> <ref>`
    pub fn pull(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(GitCommand::new(["pull", remote, branch]).in_dir(dir))
            .map(drop)
    }

    /// `git submodule update --init --recursive`
    pub fn submodule_init(&self, dir: &Path) -> Result<()> {
        self.run(GitCommand::new(["submodule", "update", "--init", "--recursive"]).in_dir(dir))
            .map(drop)
    }

    /// Short hash of `HEAD`.
    pub fn commit_id(&self, dir: &Path) -> Result<String> {
        let output = self.run(
            GitCommand::new(["rev-parse", "--short", "HEAD"])
                .in_dir(dir)
                .query(),
        )?;
        Ok(output.trim().to_string())
    }
}

/// The fetch commands for one ref.
///
/// Shallow repositories need an explicit depth and refmap, and branches also
/// need tracking configuration or later pulls have nothing to merge from. A
/// ref the remote does not know is fetched the ordinary way.
fn fetch_commands(shallow: bool, kind: RefKind, remote: &str, rev: &str) -> Vec<GitCommand> {
    match (shallow, kind) {
        (true, RefKind::Branch) => {
            let refmap = format!("+refs/heads/{rev}:refs/remotes/{remote}/{rev}");
            vec![
                shallow_fetch(remote, &[refmap.as_str()]),
                GitCommand::new([
                    "config".to_string(),
                    "--add".to_string(),
                    format!("remote.{remote}.fetch"),
                    refmap.clone(),
                ]),
                GitCommand::new([
                    "config".to_string(),
                    "--add".to_string(),
                    format!("branch.{rev}.remote"),
                    remote.to_string(),
                ]),
                GitCommand::new([
                    "config".to_string(),
                    "--add".to_string(),
                    format!("branch.{rev}.merge"),
                    format!("refs/heads/{rev}"),
                ]),
            ]
        }
        (true, RefKind::PullRequest) => {
            let refmap = format!("+refs/{rev}:refs/remotes/{remote}/{rev}");
            vec![shallow_fetch(remote, &[refmap.as_str()])]
        }
        (true, RefKind::Tag) => vec![shallow_fetch(remote, &["tag", rev])],
        (false, _) | (_, RefKind::Unknown) => vec![
            GitCommand::new(["fetch", "--tags", remote]),
            GitCommand::new(["fetch", "--quiet", remote, "+refs/pull/*:refs/pull/*"]),
        ],
    }
}

fn shallow_fetch(remote: &str, refmap: &[&str]) -> GitCommand {
    let mut args = vec!["fetch", "--depth=1", "--update-shallow", remote];
    args.extend_from_slice(refmap);
    GitCommand::new(args)
}


#[cfg(test)]
mod tests {
    use super::mock::RecordingGit;
    use super::*;
    use tempfile::TempDir;

    fn strings(commands: Vec<GitCommand>) -> Vec<String> {
        commands.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_command_display_joins_tokens() {
        let command = GitCommand::new(["pull", "origin", "main"]);
        assert_eq!(command.to_string(), "git pull origin main");
        assert!(!command.is_query());
        assert!(GitCommand::new(["status"]).query().is_query());
    }

    #[test]
    fn test_ref_kind_from_ls_remote() {
        let heads = "1a2b\trefs/heads/develop\n";
        let tags = "1a2b\trefs/tags/1.0.0\n3c4d\trefs/tags/1.0.0^{}\n";
        let pull = "1a2b\trefs/pull/12/head\n";
        assert_eq!(RefKind::from_ls_remote(heads), RefKind::Branch);
        assert_eq!(RefKind::from_ls_remote(tags), RefKind::Tag);
        assert_eq!(RefKind::from_ls_remote(pull), RefKind::PullRequest);
        assert_eq!(RefKind::from_ls_remote(""), RefKind::Unknown);
    }

    #[test]
    fn test_ref_kind_prefers_branch_over_tag() {
        let both = "1a2b\trefs/tags/main\n3c4d\trefs/heads/main\n";
        assert_eq!(RefKind::from_ls_remote(both), RefKind::Branch);
    }

    #[test]
    fn test_classify_queries_remote() {
        let git = RecordingGit::new().respond("git ls-remote", "abc\trefs/tags/0.0.1\n");
        let client = GitClient::new(&git, false);
        let kind = client.classify(Path::new("/src/p"), "origin", "0.0.1").unwrap();
        assert_eq!(kind, RefKind::Tag);
        assert!(git.issued("git ls-remote origin 0.0.1"));
    }

    #[test]
    fn test_classify_dry_run_defaults_to_branch_without_query() {
        let git = RecordingGit::new();
        let client = GitClient::new(&git, true);
        let kind = client.classify(Path::new("/src/p"), "origin", "x").unwrap();
        assert_eq!(kind, RefKind::Branch);
        assert!(git.commands().is_empty());
    }

    #[test]
    fn test_classify_failure_is_fatal() {
        let git = RecordingGit::new().fail("git ls-remote");
        let client = GitClient::new(&git, false);
        let err = client.classify(Path::new("/src/p"), "origin", "x").unwrap_err();
        assert!(matches!(err, Error::Classification { .. }));
    }

    #[test]
    fn test_fetch_commands_full_history() {
        let commands = strings(fetch_commands(false, RefKind::Branch, "origin", "main"));
        assert_eq!(
            commands,
            vec![
                "git fetch --tags origin",
                "git fetch --quiet origin +refs/pull/*:refs/pull/*",
            ]
        );
    }

    #[test]
    fn test_fetch_commands_shallow_branch_registers_tracking() {
        let commands = strings(fetch_commands(true, RefKind::Branch, "ec", "develop"));
        assert_eq!(
            commands,
            vec![
                "git fetch --depth=1 --update-shallow ec +refs/heads/develop:refs/remotes/ec/develop",
                "git config --add remote.ec.fetch +refs/heads/develop:refs/remotes/ec/develop",
                "git config --add branch.develop.remote ec",
                "git config --add branch.develop.merge refs/heads/develop",
            ]
        );
    }

    #[test]
    fn test_fetch_commands_shallow_tag_and_pull_request() {
        assert_eq!(
            strings(fetch_commands(true, RefKind::Tag, "origin", "1.0")),
            vec!["git fetch --depth=1 --update-shallow origin tag 1.0"]
        );
        assert_eq!(
            strings(fetch_commands(true, RefKind::PullRequest, "origin", "pull/7/head")),
            vec!["git fetch --depth=1 --update-shallow origin +refs/pull/7/head:refs/remotes/origin/pull/7/head"]
        );
    }

    #[test]
    fn test_fetch_commands_shallow_unknown_falls_back_to_full_fetch() {
        let commands = strings(fetch_commands(true, RefKind::Unknown, "origin", "abc123"));
        assert_eq!(commands[0], "git fetch --tags origin");
    }

    #[test]
    fn test_fetch_detects_shallow_repository() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".git")).unwrap();
        std::fs::write(temp.path().join(".git/shallow"), "abc\n").unwrap();

        let git = RecordingGit::new().respond("git ls-remote", "abc\trefs/tags/2.0\n");
        let client = GitClient::new(&git, false);
        assert!(client.is_shallow(temp.path()));
        client.fetch(temp.path(), "origin", "2.0").unwrap();
        assert!(git.issued("git fetch --depth=1 --update-shallow origin tag 2.0"));
    }

    #[test]
    fn test_remotes_parses_fetch_urls() {
        let git = RecordingGit::new().respond(
            "git remote -v",
            "origin\tssh://host/a (fetch)\norigin\tssh://host/a (push)\nfork\thttps://x/b (fetch)\n",
        );
        let client = GitClient::new(&git, false);
        let remotes = client.remotes(Path::new("/src/p")).unwrap();
        assert_eq!(
            remotes,
            vec![
                ("origin".to_string(), "ssh://host/a".to_string()),
                ("fork".to_string(), "https://x/b".to_string()),
            ]
        );
    }

    #[test]
    fn test_is_dirty_reads_porcelain_status() {
        let dirty = RecordingGit::new().respond("git status", " M src/lib.rs\n");
        assert!(GitClient::new(&dirty, false).is_dirty(Path::new("/p")).unwrap());
        let clean = RecordingGit::new().respond("git status", "\n");
        assert!(!GitClient::new(&clean, false).is_dirty(Path::new("/p")).unwrap());
    }

    #[test]
    fn test_branch_upstream_empty_is_none() {
        let git = RecordingGit::new();
        let client = GitClient::new(&git, false);
        assert_eq!(client.branch_upstream(Path::new("/p"), "main"), None);

        let git = RecordingGit::new().respond("git rev-parse --abbrev-ref", "origin/main\n");
        let client = GitClient::new(&git, false);
        assert_eq!(
            client.branch_upstream(Path::new("/p"), "main"),
            Some("origin/main".to_string())
        );
        assert!(git.issued("git rev-parse --abbrev-ref --symbolic-full-name main@{upstream}"));
    }

    #[test]
    fn test_checkout_new_creates_tracking_branch() {
        let git = RecordingGit::new().fail("git rev-parse --verify");
        let client = GitClient::new(&git, false);
        client.checkout_new(Path::new("/p"), "ec-user", "0.0.1").unwrap();
        assert!(git.issued("git checkout -b 0.0.1 ec-user/0.0.1"));
    }

    #[test]
    fn test_checkout_new_tag_checks_out_directly() {
        let git = RecordingGit::new();
        let client = GitClient::new(&git, false);
        client.checkout_new(Path::new("/p"), "origin", "1.0").unwrap();
        assert!(git.issued("git -c advice.detachedHead=false checkout 1.0"));
        assert!(!git.issued("git checkout -b 1.0 origin/1.0"));
    }

    #[test]
    fn test_system_git_dry_run_skips_mutations() {
        let git = SystemGit::new(true);
        let out = git
            .run(&GitCommand::new(["clone", "-o", "origin", "ssh://nowhere/x", "/nonexistent/x"]))
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_system_git_dry_run_skips_queries_in_missing_dirs() {
        let git = SystemGit::new(true);
        let out = git
            .run(
                &GitCommand::new(["rev-parse", "--short", "HEAD"])
                    .in_dir(Path::new("/nonexistent/dir"))
                    .query(),
            )
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_failed_attempt_is_not_logged_as_error() {
        testing_logger::setup();
        let temp = TempDir::new().unwrap();
        let target = path_arg(&temp.path().join("clone"));
        let git = SystemGit::new(false);

        let result = git.run(
            &GitCommand::new(["clone", "/nonexistent/repo", target.as_str(), "--depth=1"]).attempt(),
        );
        assert!(result.is_err());
        testing_logger::validate(|logs| {
            assert!(logs.iter().all(|l| l.level != Level::Error));
        });
    }

    #[test]
    fn test_failed_mutation_is_logged_as_error() {
        testing_logger::setup();
        let temp = TempDir::new().unwrap();
        let git = SystemGit::new(false);

        let result = git.run(&GitCommand::new(["checkout", "no-such-ref"]).in_dir(temp.path()));
        assert!(result.is_err());
        testing_logger::validate(|logs| {
            assert!(logs
                .iter()
                .any(|l| l.level == Level::Error && l.body.starts_with("ERROR: Command git checkout")));
        });
    }

    #[test]
    fn test_describe_failure_adds_auth_hint() {
        let message = describe_failure("fatal: Could not read from remote repository.\n");
        assert!(message.contains("hint:"));
        assert_eq!(describe_failure("fatal: bad ref\n"), "fatal: bad ref");
    }
}
