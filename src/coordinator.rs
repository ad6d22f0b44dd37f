//! # Parallel Sync Coordination
//!
//! Runs the executor over every planned project on a bounded worker pool and
//! collects one outcome per project, in plan order. A failing project never
//! stops the others; failures are counted once all workers have finished.
//!
//! Each project owns its working directory, so the only state shared between
//! workers is the read-only executor and the log.

use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::error::{Error, Result};
use crate::executor::{ProjectOutcome, SyncExecutor};
use crate::planner::SyncIntent;

/// Sync all `intents` with at most `parallelism` concurrent projects.
///
/// Outcomes are returned in the order of `intents`.
pub fn run(
    executor: &SyncExecutor<'_>,
    intents: &[SyncIntent],
    parallelism: usize,
) -> Result<Vec<ProjectOutcome>> {
    let workers = parallelism.max(1);
    debug!("Syncing {} projects on {} workers", intents.len(), workers);

    if workers == 1 {
        return Ok(intents.iter().map(|i| executor.sync_one(i)).collect());
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sync-{}", i))
        .build()
        .map_err(|e| Error::ThreadPool {
            message: e.to_string(),
        })?;

    Ok(pool.install(|| intents.par_iter().map(|i| executor.sync_one(i)).collect()))
}

/// Number of non-optional projects that failed.
pub fn required_failures(outcomes: &[ProjectOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| o.outcome.is_required_failure())
        .count()
}

/// Fold the outcomes into the run's verdict.
///
/// `other_failures` counts failures outside the git sync, such as symlinks
/// that could not be created.
pub fn aggregate(outcomes: &[ProjectOutcome], other_failures: usize) -> Result<()> {
    match required_failures(outcomes) + other_failures {
        0 => Ok(()),
        count => Err(Error::AggregateFailure { count }),
    }
}

/// Worker count when none was given explicitly.
///
/// Starts from the CPUs available to this process. Inside a SLURM job the
/// allocation is used instead, and the `EC_threads_per_task`,
/// `EC_tasks_per_node` and `EC_hyperthreads` variables override each factor.
pub fn detect_parallelism(env: &dyn Fn(&str) -> Option<String>) -> usize {
    let number = |key: &str| -> Option<usize> {
        let value = env(key)?;
        match value.trim().parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("WARNING: ignoring non-numeric {}={}", key, value);
                None
            }
        }
    };

    let mut threads_per_task = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mut tasks_per_node = 1;
    let mut hyperthreads = 1;

    if env("SLURM_JOB_ID").is_some() {
        threads_per_task = number("SLURM_CPUS_PER_TASK").unwrap_or(threads_per_task);
        tasks_per_node = number("SLURM_NTASKS_PER_NODE").unwrap_or(tasks_per_node);
    }
    threads_per_task = number("EC_threads_per_task").unwrap_or(threads_per_task);
    tasks_per_node = number("EC_tasks_per_node").unwrap_or(tasks_per_node);
    hyperthreads = number("EC_hyperthreads").unwrap_or(hyperthreads);

    threads_per_task
        .saturating_mul(tasks_per_node)
        .saturating_mul(hyperthreads)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{SyncOutcome, UpdatePolicy};
    use crate::git::mock::RecordingGit;
    use crate::git::GitClient;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn intent(root: &Path, name: &str, optional: bool) -> SyncIntent {
        let url = format!("ssh://host/{}", name);
        SyncIntent {
            name: name.to_string(),
            url: url.clone(),
            clone_url: url,
            version: "main".to_string(),
            declared_remote: None,
            optional,
            submodules: false,
            dir: root.join(name),
        }
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_outcomes_keep_plan_order() {
        let temp = TempDir::new().unwrap();
        let git = RecordingGit::new();
        let executor = SyncExecutor::new(GitClient::new(&git, false), UpdatePolicy::Keep, true);
        let intents: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|n| intent(temp.path(), n, false))
            .collect();

        let outcomes = run(&executor, &intents, 4).unwrap();
        let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert!(aggregate(&outcomes, 0).is_ok());
    }

    #[test]
    fn test_optional_failure_does_not_fail_run() {
        let temp = TempDir::new().unwrap();
        let git = RecordingGit::new().fail("git -c advice.detachedHead=false clone -o origin -b main ssh://host/b");
        let git = git.fail("git clone -o origin ssh://host/b");
        let executor = SyncExecutor::new(GitClient::new(&git, false), UpdatePolicy::Keep, true);
        let intents = vec![
            intent(temp.path(), "a", false),
            intent(temp.path(), "b", true),
        ];

        let outcomes = run(&executor, &intents, 2).unwrap();
        assert!(matches!(
            outcomes[1].outcome,
            SyncOutcome::SkippedOptionalFailure { .. }
        ));
        assert_eq!(required_failures(&outcomes), 0);
        assert!(aggregate(&outcomes, 0).is_ok());
        assert!(matches!(
            aggregate(&outcomes, 1),
            Err(Error::AggregateFailure { count: 1 })
        ));
    }

    #[test]
    fn test_required_failure_lets_others_finish() {
        let temp = TempDir::new().unwrap();
        let git = RecordingGit::new()
            .fail("git -c advice.detachedHead=false clone -o origin -b main ssh://host/b")
            .fail("git clone -o origin ssh://host/b");
        let executor = SyncExecutor::new(GitClient::new(&git, false), UpdatePolicy::Keep, true);
        let intents = vec![
            intent(temp.path(), "a", false),
            intent(temp.path(), "b", false),
            intent(temp.path(), "c", false),
        ];

        let outcomes = run(&executor, &intents, 3).unwrap();
        assert!(matches!(outcomes[0].outcome, SyncOutcome::Cloned { .. }));
        assert!(outcomes[1].outcome.is_required_failure());
        assert!(matches!(outcomes[2].outcome, SyncOutcome::Cloned { .. }));

        let err = aggregate(&outcomes, 0).unwrap_err();
        assert!(matches!(err, Error::AggregateFailure { count: 1 }));
        assert_eq!(err.to_string(), "Download failed with 1 errors");
    }

    #[test]
    fn test_single_worker_runs_sequentially() {
        let temp = TempDir::new().unwrap();
        let git = RecordingGit::new();
        let executor = SyncExecutor::new(GitClient::new(&git, false), UpdatePolicy::Keep, true);
        let intents = vec![intent(temp.path(), "a", false), intent(temp.path(), "b", false)];

        run(&executor, &intents, 0).unwrap();
        let clones: Vec<_> = git
            .mutating_commands()
            .into_iter()
            .filter(|c| c.contains(" clone "))
            .collect();
        assert!(clones[0].contains("ssh://host/a"));
        assert!(clones[1].contains("ssh://host/b"));
    }

    #[test]
    fn test_detect_parallelism_uses_slurm_allocation() {
        let env = env_from(&[
            ("SLURM_JOB_ID", "42"),
            ("SLURM_CPUS_PER_TASK", "4"),
            ("SLURM_NTASKS_PER_NODE", "2"),
        ]);
        assert_eq!(detect_parallelism(&env), 8);
    }

    #[test]
    fn test_detect_parallelism_ignores_slurm_outside_job() {
        let env = env_from(&[("SLURM_CPUS_PER_TASK", "64"), ("EC_threads_per_task", "3")]);
        assert_eq!(detect_parallelism(&env), 3);
    }

    #[test]
    fn test_detect_parallelism_overrides_and_minimum() {
        let env = env_from(&[
            ("EC_threads_per_task", "2"),
            ("EC_tasks_per_node", "3"),
            ("EC_hyperthreads", "2"),
        ]);
        assert_eq!(detect_parallelism(&env), 12);

        let zero = env_from(&[("EC_threads_per_task", "0")]);
        assert_eq!(detect_parallelism(&zero), 1);

        let huge = usize::MAX.to_string();
        let huge = env_from(&[("EC_threads_per_task", huge.as_str()), ("EC_hyperthreads", "2")]);
        assert_eq!(detect_parallelism(&huge), usize::MAX);

        let junk = env_from(&[("EC_threads_per_task", "many"), ("EC_tasks_per_node", "1")]);
        assert!(detect_parallelism(&junk) >= 1);
    }
}
