//! Job run identity, state machine and outcome bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = u64;

/// Parameter set identifying one logical run. The scheduler stamps each
/// trigger with the current time, so two distinct triggers never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobParams {
    pub started_at_ms: i64,
}

impl JobParams {
    pub fn now() -> Self {
        Self { started_at_ms: Utc::now().timestamp_millis() }
    }

    pub fn at(started_at_ms: i64) -> Self {
        Self { started_at_ms }
    }
}

impl std::fmt::Display for JobParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "startAt={}", self.started_at_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed,
    Abandoned,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Abandoned)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(JobState::Created),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "abandoned" => Ok(JobState::Abandoned),
            _ => Err(anyhow::anyhow!("invalid job state: {}", s)),
        }
    }
}

/// Counters collected while one run executes. `succeeded` is the
/// executor's verdict after applying the configured failure mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub lines_read: usize,
    pub parse_errors: usize,
    pub transform_errors: usize,
    pub records_skipped: usize,
    pub chunks_submitted: usize,
    pub chunks_failed: usize,
    pub records_written: usize,
    pub succeeded: bool,
    pub first_failure: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn new() -> Self {
        Self { started_at: Some(Utc::now()), ..Default::default() }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }
}

/// Terminal verdict handed to the registry once a run resolves.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    Failed { report: Option<RunReport>, error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: RunId,
    pub job_name: String,
    pub params: JobParams,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub report: Option<RunReport>,
    pub error: Option<String>,
}

impl JobRun {
    pub fn new(id: RunId, job_name: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_name: job_name.into(),
            params,
            state: JobState::Created,
            created_at: now,
            updated_at: now,
            report: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn matches(&self, job_name: &str, params: JobParams) -> bool {
        self.job_name == job_name && self.params == params
    }
}
