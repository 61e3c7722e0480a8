//! 在线扩容（数据迁移）作业引擎。
//!
//! 一个迁移配置被拆分为若干互不相交的同步任务，每个任务是一条
//! `Dumper -> 有界通道 -> Importer` 流水线，并以位点（Position）记录进度，失败后可从位点续传。

pub mod position;
pub mod config;
pub mod record;
pub mod dumper;
pub mod importer;
pub mod task;
pub mod job;

pub use config::migration_config::MigrationConfig;
pub use job::job_manager::JobManager;
pub use position::Position;
pub use task::task_id::TaskId;
