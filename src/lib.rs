pub mod config;
pub mod core;
pub mod job;
pub mod pipeline;
pub mod schedule;
pub mod sink;
pub mod source;

pub use crate::config::AppConfig;
pub use crate::core::*;
pub use crate::job::{JobParams, JobRegistry, JobRun, JobState, RunOutcome, RunReport};
pub use crate::pipeline::{ChunkConfig, ChunkExecutor, FailureMode, TransformErrorPolicy};
pub use crate::schedule::Scheduler;
