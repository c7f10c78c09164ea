use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("transform error: {0}")]
    Transform(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("source error: {0}")]
    Source(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BatchError {
    /// Per-record errors stay inside the run report; anything else aborts
    /// the run that hit it.
    pub fn is_record_level(&self) -> bool {
        matches!(self, BatchError::Parse { .. } | BatchError::Transform(_))
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
