pub mod task_id;
pub mod signal;
pub mod progress;
pub mod sync_task;
