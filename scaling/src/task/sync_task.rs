use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use common::err::CResult;
use connection::DataSourceProvider;

use crate::config::sync_config::SyncTaskConfig;
use crate::dumper::{run_dumper, DumpOutcome, DumperContext};
use crate::importer::{ImportOutcome, Importer};
use crate::position::{Position, PositionTracker};
use crate::task::progress::{TaskProgress, TaskStatus};
use crate::task::signal::StopSignal;
use crate::task::task_id::TaskId;

/// 任务的结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 仅全量任务已完成
    Finished(Position),

    Stopped(Position),

    Failed(String),
}

/// 同步任务：一个 Dumper 与一个 Importer，经有界通道相连。
///
/// 两端各自运行在独立的 tokio 任务中。任何一端退出都会关闭通道，另一端随之结束，
/// 因此不会出现一端永久挂起的情况。
pub struct SyncTask {
    config: SyncTaskConfig,

    progress: Arc<TaskProgress>,
}

impl SyncTask {
    pub fn new(config: SyncTaskConfig, start: Position) -> Self {
        SyncTask {
            config,
            progress: Arc::new(TaskProgress::new(start)),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        self.config.task_id()
    }

    pub fn config(&self) -> &SyncTaskConfig {
        &self.config
    }

    pub fn progress(&self) -> &Arc<TaskProgress> {
        &self.progress
    }

    /// 从 tracker 中已提交的位点开始运行，直到完成、停止或失败
    pub async fn run(&self, provider: Arc<DataSourceProvider>, tracker: Arc<PositionTracker>,
                     signal: StopSignal) -> TaskOutcome {
        let task_id = self.task_id().clone();
        let start = tracker.get(&task_id);
        if start.is_finished() {
            self.progress.set_status(TaskStatus::Finished);
            return TaskOutcome::Finished(start);
        }

        self.progress.set_status(TaskStatus::Running);
        info!("sync task {} start from {}", task_id, start);

        let (tx, mut rx) = mpsc::channel(*self.config.channel_capacity());

        let ctx = DumperContext {
            config: self.config.dumper().clone(),
            provider: Arc::clone(&provider),
            progress: Arc::clone(&self.progress),
        };
        let dumper = tokio::spawn(run_dumper(ctx, start, tx, signal.clone()));

        let importer = Importer::new(task_id.clone(), self.config.importer().clone(), provider,
                                     Arc::clone(&tracker), Arc::clone(&self.progress));
        let mut importer_signal = signal;
        let importer = tokio::spawn(async move {
            let outcome = importer.run(&mut rx, &mut importer_signal).await;
            // rx 在此释放，阻塞中的 Dumper 随即返回
            outcome
        });

        let (dumped, imported) = tokio::join!(dumper, importer);
        let outcome = resolve(&task_id, dumped, imported, tracker.get(&task_id));

        match &outcome {
            TaskOutcome::Finished(p) => {
                info!("sync task {} finished at {}", task_id, p);
                self.progress.set_status(TaskStatus::Finished);
            }
            TaskOutcome::Stopped(p) => {
                info!("sync task {} stopped at {}", task_id, p);
                self.progress.set_status(TaskStatus::Stopped);
            }
            TaskOutcome::Failed(reason) => {
                error!("sync task {} failed: {}", task_id, reason);
                self.progress.set_status(TaskStatus::Failed(reason.clone()));
            }
        }

        outcome
    }
}

fn resolve(task_id: &TaskId,
           dumped: Result<CResult<DumpOutcome>, JoinError>,
           imported: Result<CResult<ImportOutcome>, JoinError>,
           committed: Position) -> TaskOutcome {
    // 写入端的异常优先，读取端常因通道关闭而随之退出
    let imported = match imported {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return TaskOutcome::Failed(e.to_string()),
        Err(e) => return TaskOutcome::Failed(format!("importer aborted: {}", e)),
    };
    let dumped = match dumped {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return TaskOutcome::Failed(e.to_string()),
        Err(e) => return TaskOutcome::Failed(format!("dumper aborted: {}", e)),
    };

    match (dumped, imported) {
        (DumpOutcome::Exhausted(_), ImportOutcome::Drained(p)) if p.is_finished() => TaskOutcome::Finished(p),
        (DumpOutcome::Exhausted(d), ImportOutcome::Drained(p)) => {
            warn!("sync task {} drained at {} before reaching {}", task_id, p, d);
            TaskOutcome::Stopped(committed)
        }
        _ => TaskOutcome::Stopped(committed),
    }
}
