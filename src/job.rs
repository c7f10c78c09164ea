pub mod registry;
pub mod run;

pub use self::registry::JobRegistry;
pub use self::run::{JobParams, JobRun, JobState, RunId, RunOutcome, RunReport};
