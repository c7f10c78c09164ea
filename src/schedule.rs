//! Cron-driven trigger loop for the import job.

use crate::core::{BatchError, RecordSource, Result};
use crate::job::{JobParams, JobRegistry, RunId, RunOutcome};
use crate::pipeline::ChunkExecutor;
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Fires the import job at each occurrence of a cron pattern.
///
/// The expression is parsed at construction, so a bad schedule stops the
/// process at startup rather than at the first trigger. Ticks that land
/// while the previous run is still live are rejected by the registry and
/// logged as skipped, never queued.
pub struct Scheduler {
    job_name: String,
    schedule: Schedule,
    registry: Arc<JobRegistry>,
    executor: Arc<ChunkExecutor>,
    source: Arc<dyn RecordSource>,
}

impl Scheduler {
    pub fn new(
        job_name: impl Into<String>,
        expression: &str,
        registry: Arc<JobRegistry>,
        executor: Arc<ChunkExecutor>,
        source: Arc<dyn RecordSource>,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| {
            BatchError::Config(format!("invalid cron expression '{expression}': {e}"))
        })?;
        Ok(Self { job_name: job_name.into(), schedule, registry, executor, source })
    }

    /// Runs until the shutdown signal flips, then waits for in-flight
    /// runs to resolve before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(job = %self.job_name, schedule = %self.schedule, "scheduler started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!(job = %self.job_name, "schedule has no further occurrences");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    while in_flight.try_join_next().is_some() {}
                    if let Some(handle) = self.trigger() {
                        in_flight.spawn(async move {
                            let _ = handle.await;
                        });
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(job = %self.job_name, "shutdown requested, no further ticks");
                        break;
                    }
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!(job = %self.job_name, "scheduler stopped");
    }

    /// One trigger attempt: register a run with fresh parameters and
    /// spawn its execution. Returns `None` for a skipped tick.
    pub fn trigger(&self) -> Option<tokio::task::JoinHandle<()>> {
        let params = JobParams::now();
        match self.registry.start(&self.job_name, params) {
            Ok(run) => {
                info!(job = %self.job_name, run_id = run.id, %params, "trigger accepted");
                let registry = self.registry.clone();
                let executor = self.executor.clone();
                let source = self.source.clone();
                Some(tokio::spawn(async move {
                    execute_run(run.id, registry, executor, source).await;
                }))
            }
            Err(BatchError::AlreadyRunning(job)) => {
                warn!(job = %job, "tick skipped, previous run still in flight");
                None
            }
            Err(e) => {
                error!(job = %self.job_name, error = %e, "trigger failed");
                None
            }
        }
    }
}

/// Drives one registered run to a terminal state.
pub async fn execute_run(
    run_id: RunId,
    registry: Arc<JobRegistry>,
    executor: Arc<ChunkExecutor>,
    source: Arc<dyn RecordSource>,
) {
    if let Err(e) = registry.dispatch(run_id) {
        error!(run_id, error = %e, "could not dispatch run");
        return;
    }

    let outcome = match executor.run(source.as_ref()).await {
        Ok(report) => {
            info!(
                run_id,
                lines = report.lines_read,
                written = report.records_written,
                skipped = report.records_skipped,
                parse_errors = report.parse_errors,
                transform_errors = report.transform_errors,
                chunks = report.chunks_submitted,
                chunks_failed = report.chunks_failed,
                succeeded = report.succeeded,
                "run finished"
            );
            if report.succeeded {
                RunOutcome::Completed(report)
            } else {
                let error = report
                    .first_failure
                    .clone()
                    .unwrap_or_else(|| "chunk failures".to_string());
                RunOutcome::Failed { report: Some(report), error }
            }
        }
        Err(e) => {
            error!(run_id, error = %e, "run aborted");
            RunOutcome::Failed { report: None, error: e.to_string() }
        }
    };

    if let Err(e) = registry.complete(run_id, outcome) {
        error!(run_id, error = %e, "could not record run outcome");
    }
}
