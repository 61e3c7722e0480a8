pub mod job;
pub mod job_manager;

pub use job::{Job, JobProgress, JobState, JobSummary};
