//! Run bookkeeping: at most one live run per job, journaled to disk.

use crate::core::{BatchError, Result};
use crate::job::run::{JobParams, JobRun, JobState, RunId, RunOutcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Tracks in-flight and completed job runs.
///
/// The run map is the one piece of state shared between the scheduler
/// and executing runs; every check-and-set on it happens under one lock.
/// With a journal path configured, each transition snapshots the map to
/// a JSON file so interrupted runs are recognizable after a restart.
pub struct JobRegistry {
    inner: Mutex<Inner>,
    journal_path: Option<PathBuf>,
}

#[derive(Default)]
struct Inner {
    next_id: RunId,
    runs: HashMap<RunId, JobRun>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()), journal_path: None }
    }

    pub fn with_journal<P: Into<PathBuf>>(journal_path: P) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            journal_path: Some(journal_path.into()),
        }
    }

    /// Reloads the journal and reclassifies any run left in a live state
    /// by a dead process as abandoned. Returns the abandoned runs so the
    /// caller can decide whether to launch catch-up runs. Chunk progress
    /// is not checkpointed: an abandoned run restarts from scratch.
    pub fn recover(&self) -> Result<Vec<JobRun>> {
        let Some(path) = &self.journal_path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let runs: Vec<JobRun> = serde_json::from_str(&contents)?;

        let mut inner = self.lock()?;
        let mut abandoned = Vec::new();
        for mut run in runs {
            inner.next_id = inner.next_id.max(run.id);
            if !run.is_terminal() {
                warn!(run_id = run.id, job = %run.job_name, state = %run.state,
                    "journaled run had no live execution, marking abandoned");
                run.state = JobState::Abandoned;
                run.updated_at = chrono::Utc::now();
                abandoned.push(run.clone());
            }
            inner.runs.insert(run.id, run);
        }
        self.persist(&inner)?;
        Ok(abandoned)
    }

    /// Registers a new run, rejecting it while any run of the same job
    /// is still live. The check and the insert are a single atomic step.
    pub fn start(&self, job_name: &str, params: JobParams) -> Result<JobRun> {
        let mut inner = self.lock()?;
        if inner
            .runs
            .values()
            .any(|run| run.job_name == job_name && !run.is_terminal())
        {
            return Err(BatchError::AlreadyRunning(job_name.to_string()));
        }

        inner.next_id += 1;
        let run = JobRun::new(inner.next_id, job_name, params);
        inner.runs.insert(run.id, run.clone());
        if let Err(e) = self.persist(&inner) {
            inner.runs.remove(&run.id);
            return Err(e);
        }
        Ok(run)
    }

    /// Created -> Running, once the run is handed to the executor.
    pub fn dispatch(&self, id: RunId) -> Result<JobRun> {
        self.transition(id, |run| {
            if run.state != JobState::Created {
                return Err(BatchError::Registry(format!(
                    "run {} cannot be dispatched from state {}",
                    run.id, run.state
                )));
            }
            run.state = JobState::Running;
            Ok(())
        })
    }

    /// Running -> Completed | Failed with the final report attached.
    pub fn complete(&self, id: RunId, outcome: RunOutcome) -> Result<JobRun> {
        self.transition(id, |run| {
            if run.is_terminal() {
                return Err(BatchError::Registry(format!(
                    "run {} already resolved as {}",
                    run.id, run.state
                )));
            }
            match outcome {
                RunOutcome::Completed(report) => {
                    run.state = JobState::Completed;
                    run.report = Some(report);
                }
                RunOutcome::Failed { report, error } => {
                    run.state = JobState::Failed;
                    run.report = report;
                    run.error = Some(error);
                }
            }
            Ok(())
        })
    }

    pub fn find(&self, job_name: &str, params: JobParams) -> Option<JobRun> {
        let inner = self.lock().ok()?;
        inner
            .runs
            .values()
            .find(|run| run.matches(job_name, params))
            .cloned()
    }

    pub fn get(&self, id: RunId) -> Option<JobRun> {
        let inner = self.lock().ok()?;
        inner.runs.get(&id).cloned()
    }

    pub fn running(&self, job_name: &str) -> bool {
        self.lock()
            .map(|inner| {
                inner
                    .runs
                    .values()
                    .any(|run| run.job_name == job_name && !run.is_terminal())
            })
            .unwrap_or(false)
    }

    pub fn runs(&self) -> Vec<JobRun> {
        self.lock()
            .map(|inner| inner.runs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn transition(&self, id: RunId, apply: impl FnOnce(&mut JobRun) -> Result<()>) -> Result<JobRun> {
        let mut inner = self.lock()?;
        let run = inner
            .runs
            .get_mut(&id)
            .ok_or_else(|| BatchError::Registry(format!("unknown run id {id}")))?;
        apply(run)?;
        run.updated_at = chrono::Utc::now();
        let updated = run.clone();
        info!(run_id = updated.id, job = %updated.job_name, state = %updated.state, "run transition");
        self.persist(&inner)?;
        Ok(updated)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BatchError::Registry("registry lock poisoned".to_string()))
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        let Some(path) = &self.journal_path else {
            return Ok(());
        };
        let mut runs: Vec<&JobRun> = inner.runs.values().collect();
        runs.sort_by_key(|run| run.id);
        std::fs::write(path, serde_json::to_vec_pretty(&runs)?)?;
        Ok(())
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::run::RunReport;
    use std::sync::Arc;

    const JOB: &str = "import-employees";

    #[test]
    fn start_rejects_duplicate_params_while_running() {
        let registry = JobRegistry::new();
        let params = JobParams::at(1000);
        registry.start(JOB, params).unwrap();

        let second = registry.start(JOB, params);
        assert!(matches!(second, Err(BatchError::AlreadyRunning(_))));
    }

    #[test]
    fn start_rejects_overlap_with_fresh_params() {
        let registry = JobRegistry::new();
        let run = registry.start(JOB, JobParams::at(1000)).unwrap();
        registry.dispatch(run.id).unwrap();

        assert!(matches!(
            registry.start(JOB, JobParams::at(2000)),
            Err(BatchError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn start_allowed_again_after_completion() {
        let registry = JobRegistry::new();
        let run = registry.start(JOB, JobParams::at(1000)).unwrap();
        registry.dispatch(run.id).unwrap();
        registry
            .complete(run.id, RunOutcome::Completed(RunReport::new()))
            .unwrap();

        assert!(registry.start(JOB, JobParams::at(2000)).is_ok());
    }

    #[test]
    fn concurrent_starts_admit_exactly_one_run() {
        let registry = Arc::new(JobRegistry::new());
        let params = JobParams::at(1000);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.start(JOB, params).is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&admitted| admitted)
            .count();
        assert_eq!(admitted, 1);

        let live = registry
            .runs()
            .into_iter()
            .filter(|run| !run.is_terminal())
            .count();
        assert_eq!(live, 1);
    }

    #[test]
    fn dispatch_requires_created_state() {
        let registry = JobRegistry::new();
        let run = registry.start(JOB, JobParams::at(1)).unwrap();
        registry.dispatch(run.id).unwrap();

        assert!(matches!(
            registry.dispatch(run.id),
            Err(BatchError::Registry(_))
        ));
    }

    #[test]
    fn complete_records_failure_cause() {
        let registry = JobRegistry::new();
        let run = registry.start(JOB, JobParams::at(1)).unwrap();
        registry.dispatch(run.id).unwrap();

        let failed = registry
            .complete(
                run.id,
                RunOutcome::Failed { report: None, error: "chunk 3 write failed".to_string() },
            )
            .unwrap();

        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("chunk 3 write failed"));
    }

    #[test]
    fn find_matches_name_and_params() {
        let registry = JobRegistry::new();
        let params = JobParams::at(7);
        registry.start(JOB, params).unwrap();

        assert!(registry.find(JOB, params).is_some());
        assert!(registry.find(JOB, JobParams::at(8)).is_none());
        assert!(registry.find("other", params).is_none());
    }

    #[test]
    fn recover_marks_live_journal_entries_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("runs.json");

        {
            let registry = JobRegistry::with_journal(&journal);
            let run = registry.start(JOB, JobParams::at(1000)).unwrap();
            registry.dispatch(run.id).unwrap();
            // process "dies" here with the run still marked running
        }

        let registry = JobRegistry::with_journal(&journal);
        let abandoned = registry.recover().unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].state, JobState::Abandoned);

        // the slot is free again and run ids keep increasing
        let next = registry.start(JOB, JobParams::at(2000)).unwrap();
        assert!(next.id > abandoned[0].id);
    }

    #[test]
    fn recover_without_journal_is_a_noop() {
        let registry = JobRegistry::new();
        assert!(registry.recover().unwrap().is_empty());
    }
}
