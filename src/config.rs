//! Environment-driven configuration, resolved once at startup.

use crate::core::{BatchError, Result};
use crate::pipeline::{ChunkConfig, FailureMode, TransformErrorPolicy};

/// Process configuration. Every knob has a default; `BATCHPIPE_*`
/// environment variables override them. Invalid values are startup
/// errors, not first-trigger surprises.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub job_name: String,
    pub input_path: String,
    /// Empty means the in-memory store; otherwise a JSON-lines file.
    pub store_path: String,
    pub schedule: String,
    pub chunk_size: usize,
    pub worker_limit: usize,
    pub lines_to_skip: usize,
    pub strict: bool,
    pub transform_error_policy: TransformErrorPolicy,
    pub failure_mode: FailureMode,
    /// Empty disables the run journal (and with it abandoned-run recovery).
    pub journal_path: String,
    pub restart_abandoned: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            job_name: "import-employees".to_string(),
            input_path: "data.csv".to_string(),
            store_path: String::new(),
            schedule: "0 0 1 * * *".to_string(),
            chunk_size: 10,
            worker_limit: 10,
            lines_to_skip: 1,
            strict: false,
            transform_error_policy: TransformErrorPolicy::SkipRecord,
            failure_mode: FailureMode::FailJob,
            journal_path: String::new(),
            restart_abandoned: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            job_name: env_string("BATCHPIPE_JOB_NAME", defaults.job_name),
            input_path: env_string("BATCHPIPE_INPUT", defaults.input_path),
            store_path: env_string("BATCHPIPE_STORE", defaults.store_path),
            schedule: env_string("BATCHPIPE_SCHEDULE", defaults.schedule),
            chunk_size: env_parse("BATCHPIPE_CHUNK_SIZE", defaults.chunk_size)?,
            worker_limit: env_parse("BATCHPIPE_WORKER_LIMIT", defaults.worker_limit)?,
            lines_to_skip: env_parse("BATCHPIPE_LINES_TO_SKIP", defaults.lines_to_skip)?,
            strict: env_flag("BATCHPIPE_STRICT", defaults.strict),
            transform_error_policy: parse_transform_policy(&env_string(
                "BATCHPIPE_ON_TRANSFORM_ERROR",
                "skip".to_string(),
            ))?,
            failure_mode: parse_failure_mode(&env_string(
                "BATCHPIPE_FAILURE_MODE",
                "fail-job".to_string(),
            ))?,
            journal_path: env_string("BATCHPIPE_JOURNAL", defaults.journal_path),
            restart_abandoned: env_flag("BATCHPIPE_RESTART_ABANDONED", defaults.restart_abandoned),
        })
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            worker_limit: self.worker_limit,
            transform_error_policy: self.transform_error_policy,
            failure_mode: self.failure_mode,
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn env_parse(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| BatchError::Config(format!("{key} must be a positive integer, got '{value}'"))),
        Err(_) => Ok(default),
    }
}

fn parse_transform_policy(value: &str) -> Result<TransformErrorPolicy> {
    match value {
        "skip" => Ok(TransformErrorPolicy::SkipRecord),
        "fail-chunk" => Ok(TransformErrorPolicy::FailChunk),
        other => Err(BatchError::Config(format!(
            "unknown transform error policy '{other}' (expected skip or fail-chunk)"
        ))),
    }
}

fn parse_failure_mode(value: &str) -> Result<FailureMode> {
    match value {
        "fail-job" => Ok(FailureMode::FailJob),
        "fail-fast" => Ok(FailureMode::FailFast),
        "best-effort" => Ok(FailureMode::BestEffort),
        other => Err(BatchError::Config(format!(
            "unknown failure mode '{other}' (expected fail-job, fail-fast or best-effort)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse_from_config_strings() {
        assert_eq!(parse_transform_policy("skip").unwrap(), TransformErrorPolicy::SkipRecord);
        assert_eq!(parse_transform_policy("fail-chunk").unwrap(), TransformErrorPolicy::FailChunk);
        assert!(parse_transform_policy("explode").is_err());

        assert_eq!(parse_failure_mode("fail-job").unwrap(), FailureMode::FailJob);
        assert_eq!(parse_failure_mode("fail-fast").unwrap(), FailureMode::FailFast);
        assert_eq!(parse_failure_mode("best-effort").unwrap(), FailureMode::BestEffort);
        assert!(parse_failure_mode("whatever").is_err());
    }

    #[test]
    fn defaults_mirror_the_reference_job() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.worker_limit, 10);
        assert_eq!(config.lines_to_skip, 1);
        assert!(!config.strict);
    }
}
