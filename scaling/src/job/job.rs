use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info, warn};

use common::err::scaling_error::ReError;
use common::err::CResult;
use common::time_util::now_str;
use connection::DataSourceProvider;

use crate::config::migration_config::MigrationConfig;
use crate::config::sync_config::SyncTaskConfig;
use crate::position::PositionTracker;
use crate::task::progress::TaskProgressView;
use crate::task::signal::{RunSignal, StopSignal};
use crate::task::sync_task::{SyncTask, TaskOutcome};
use crate::task::task_id::TaskId;

/// 作业状态。
///
/// ```text
/// CREATED -> RUNNING -> STOPPING -> STOPPED
///               \-> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Stopped | JobState::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Running => "RUNNING",
            JobState::Stopping => "STOPPING",
            JobState::Stopped => "STOPPED",
            JobState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// list 命令返回的作业摘要
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: u64,

    pub state: JobState,

    pub create_time: String,

    pub task_count: usize,
}

/// progress 命令返回的作业进度快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: u64,

    pub state: JobState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// 全量阶段总体完成百分比
    pub percent: u8,

    pub tasks: Vec<TaskProgressView>,
}

/// 一次迁移作业。
///
/// 状态只在持有 inner 锁时修改，锁不跨越 await。任务在独立的 tokio 任务中运行，
/// 结束时回调 [`Job::on_task_finished`]；STOPPING -> STOPPED 只由最后一个退出的任务完成，
/// stop 调用本身只发出信号并等待，中途被丢弃不影响作业收尾。
pub struct Job {
    id: u64,

    config: Arc<MigrationConfig>,

    create_time: String,

    tasks: Vec<Arc<SyncTask>>,

    tracker: Arc<PositionTracker>,

    inner: Mutex<JobInner>,

    /// 状态变化通知，等待作业终止的 stop 调用订阅它
    state_tx: watch::Sender<JobState>,

    stop_tx: watch::Sender<RunSignal>,

    signal: StopSignal,
}

struct JobInner {
    state: JobState,

    running: usize,

    finished: usize,

    failure: Option<String>,

    history: Vec<JobState>,
}

impl Job {
    pub fn new(id: u64, config: Arc<MigrationConfig>, tasks: Vec<SyncTaskConfig>, tracker: Arc<PositionTracker>) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|t| {
                let start = tracker.get(t.task_id());
                Arc::new(SyncTask::new(t, start))
            })
            .collect();
        let (state_tx, _) = watch::channel(JobState::Created);
        let (stop_tx, signal) = StopSignal::channel();

        Job {
            id,
            config,
            create_time: now_str(),
            tasks,
            tracker,
            inner: Mutex::new(JobInner {
                state: JobState::Created,
                running: 0,
                finished: 0,
                failure: None,
                history: vec![JobState::Created],
            }),
            state_tx,
            stop_tx,
            signal,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &Arc<MigrationConfig> {
        &self.config
    }

    pub fn create_time(&self) -> &str {
        &self.create_time
    }

    pub fn tasks(&self) -> &[Arc<SyncTask>] {
        &self.tasks
    }

    pub fn tracker(&self) -> &Arc<PositionTracker> {
        &self.tracker
    }

    pub fn state(&self) -> JobState {
        *self.state_tx.borrow()
    }

    /// 作业经历过的全部状态
    pub fn history(&self) -> Vec<JobState> {
        self.lock().history.clone()
    }

    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// CREATED -> RUNNING，在 runtime 上并发启动全部任务
    pub fn start(self: &Arc<Self>, provider: Arc<DataSourceProvider>, runtime: &Handle) -> CResult<()> {
        let mut inner = self.lock();
        if inner.state != JobState::Created {
            return Err(ReError::InvalidStateError(format!(
                "scaling job {} is {}, only CREATED job can be started", self.id, inner.state)));
        }
        self.transition(&mut inner, JobState::Running);
        inner.running = self.tasks.len();

        for task in &self.tasks {
            let job = Arc::clone(self);
            let task = Arc::clone(task);
            let provider = Arc::clone(&provider);
            let tracker = Arc::clone(&self.tracker);
            let signal = self.signal.clone();
            let running = Arc::clone(&task);
            let handle = runtime.spawn(async move { running.run(provider, tracker, signal).await });
            // 任务 panic 时同样回调，作业不会停留在 RUNNING / STOPPING
            runtime.spawn(async move {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => TaskOutcome::Failed(format!("task aborted: {}", e)),
                };
                job.on_task_finished(task.task_id(), outcome);
            });
        }
        info!("scaling job {} started with {} tasks", self.id, self.tasks.len());

        Ok(())
    }

    /// 停止作业，所有任务确认退出后返回。
    ///
    /// CREATED 的作业直接进入 STOPPED；已终止的作业直接返回成功；
    /// 正在停止的作业与首次 stop 一样等待最后一个任务退出。
    pub async fn stop(&self) -> CResult<()> {
        {
            let mut inner = self.lock();
            match inner.state {
                JobState::Stopped | JobState::Failed => return Ok(()),
                JobState::Created => {
                    self.transition(&mut inner, JobState::Stopped);
                    info!("scaling job {} stopped before start", self.id);
                    return Ok(());
                }
                JobState::Running => {
                    self.transition(&mut inner, JobState::Stopping);
                    self.stop_tx.send_replace(RunSignal::Stop);
                    if inner.running == 0 {
                        self.transition(&mut inner, JobState::Stopped);
                        return Ok(());
                    }
                    info!("scaling job {} stopping, waiting for {} tasks", self.id, inner.running);
                }
                JobState::Stopping => {}
            }
        }

        self.wait_terminal().await
    }

    /// 任务结束回调。任一任务失败使作业快速失败并通知其它任务停止；
    /// 最后一个任务退出时作业进入 STOPPED
    pub fn on_task_finished(&self, task_id: &TaskId, outcome: TaskOutcome) {
        let mut inner = self.lock();
        inner.running = inner.running.saturating_sub(1);

        match outcome {
            TaskOutcome::Failed(reason) => {
                let failure = format!("task {} failed: {}", task_id, reason);
                match inner.state {
                    JobState::Running => {
                        error!("scaling job {} {}, stop all tasks", self.id, failure);
                        inner.failure = Some(failure);
                        self.transition(&mut inner, JobState::Failed);
                        self.stop_tx.send_replace(RunSignal::Stop);
                    }
                    _ => {
                        warn!("scaling job {} {} while {}", self.id, failure, inner.state);
                        inner.failure.get_or_insert(failure);
                    }
                }
            }
            TaskOutcome::Finished(_) => inner.finished += 1,
            TaskOutcome::Stopped(_) => {}
        }

        if inner.running > 0 {
            return;
        }
        match inner.state {
            JobState::Running => {
                info!("scaling job {} all tasks exited, {} of {} finished", self.id, inner.finished, self.tasks.len());
                self.transition(&mut inner, JobState::Stopping);
                self.transition(&mut inner, JobState::Stopped);
            }
            JobState::Stopping => {
                self.transition(&mut inner, JobState::Stopped);
                info!("scaling job {} stopped", self.id);
            }
            _ => {}
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            state: self.state(),
            create_time: self.create_time.clone(),
            task_count: self.tasks.len(),
        }
    }

    /// 进度快照，不等待任何运行中的任务
    pub fn progress(&self) -> JobProgress {
        let tasks: Vec<TaskProgressView> = self.tasks
            .iter()
            .map(|t| t.progress().view(t.task_id(), self.tracker.get(t.task_id())))
            .collect();
        let percent = if tasks.is_empty() {
            0
        } else {
            (tasks.iter().map(|t| t.percent as usize).sum::<usize>() / tasks.len()) as u8
        };

        JobProgress {
            job_id: self.id,
            state: self.state(),
            failure: self.failure(),
            percent,
            tasks,
        }
    }

    async fn wait_terminal(&self) -> CResult<()> {
        let mut rx = self.state_tx.subscribe();
        rx.wait_for(|s| s.is_terminal())
            .await
            .map(|_| ())
            .map_err(|e| ReError::String(format!("scaling job {} state channel closed: {}", self.id, e)))
    }

    fn transition(&self, inner: &mut JobInner, to: JobState) {
        info!("scaling job {} {} -> {}", self.id, inner.state, to);
        inner.state = to;
        inner.history.push(to);
        self.state_tx.send_replace(to);
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("create_time", &self.create_time)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
