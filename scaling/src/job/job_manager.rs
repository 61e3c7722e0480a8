use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use futures_util::future::join_all;
use tracing::{info, warn};

use common::config::JobDefaults;
use common::err::scaling_error::ReError;
use common::err::CResult;
use connection::DataSourceProvider;

use crate::config::migration_config::MigrationConfig;
use crate::config::translator::ConfigTranslator;
use crate::job::job::{Job, JobProgress, JobState, JobSummary};
use crate::position::{Position, PositionTracker};
use crate::task::task_id::TaskId;

/// 作业注册表与控制入口，作业状态只经由这里修改。
///
/// 注册表按作业 id 分段加锁，不同作业上的操作互不阻塞。
pub struct JobManager {
    jobs: DashMap<u64, Arc<Job>>,

    next_id: AtomicU64,

    provider: Arc<DataSourceProvider>,

    translator: ConfigTranslator,

    /// 任务运行的 runtime，为空时使用调用方所在的 runtime
    runtime: Option<Handle>,
}

impl Default for JobManager {
    fn default() -> Self {
        JobManager::new(JobDefaults::default())
    }
}

impl JobManager {
    pub fn new(defaults: JobDefaults) -> Self {
        let provider = DataSourceProvider::new(defaults.pool_size, Duration::from_millis(defaults.acquire_timeout_ms));
        JobManager::with_provider(Arc::new(provider), defaults)
    }

    pub fn with_provider(provider: Arc<DataSourceProvider>, defaults: JobDefaults) -> Self {
        JobManager {
            jobs: DashMap::new(),
            next_id: AtomicU64::new(1),
            provider,
            translator: ConfigTranslator::new(defaults),
            runtime: None,
        }
    }

    /// 指定任务运行的 runtime，控制面与任务可以运行在不同的 runtime 上
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn provider(&self) -> &Arc<DataSourceProvider> {
        &self.provider
    }

    /// 拆分任务并注册作业，作业处于 CREATED。配置错误时作业不会被注册
    pub fn create(&self, config: MigrationConfig) -> CResult<Arc<Job>> {
        self.create_with_positions(config, BTreeMap::new())
    }

    /// 以已提交的位点创建作业，用于续传
    pub fn create_with_positions(&self, config: MigrationConfig, positions: BTreeMap<TaskId, Position>) -> CResult<Arc<Job>> {
        let tasks = self.translator.translate(&config)?;

        let known: Vec<&TaskId> = tasks.iter().map(|t| t.task_id()).collect();
        let positions: BTreeMap<TaskId, Position> = positions
            .into_iter()
            .filter(|(id, _)| {
                let found = known.contains(&id);
                if !found {
                    warn!("ignore position of unknown task {}", id);
                }
                found
            })
            .collect();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tracker = Arc::new(PositionTracker::with_positions(positions));
        let job = Arc::new(Job::new(id, Arc::new(config), tasks, tracker));
        self.jobs.insert(id, Arc::clone(&job));
        info!("scaling job {} created with {} tasks", id, job.tasks().len());

        Ok(job)
    }

    pub fn start(&self, job_id: u64) -> CResult<()> {
        let job = self.get(job_id)?;
        job.start(Arc::clone(&self.provider), &self.runtime()?)
    }

    /// 创建并启动，返回作业 id
    pub fn start_new(&self, config: MigrationConfig) -> CResult<u64> {
        let job = self.create(config)?;
        job.start(Arc::clone(&self.provider), &self.runtime()?)?;
        Ok(job.id())
    }

    /// 停止作业，作业进入 STOPPED 后返回
    pub async fn stop(&self, job_id: u64) -> CResult<()> {
        let job = self.get(job_id)?;
        job.stop().await
    }

    /// 以已停止或失败作业的位点创建并启动新作业，返回新作业 id
    pub fn resume(&self, job_id: u64) -> CResult<u64> {
        let job = self.get(job_id)?;
        let state = job.state();
        if !state.is_terminal() {
            return Err(ReError::InvalidStateError(format!(
                "scaling job {} is {}, only STOPPED or FAILED job can be resumed", job_id, state)));
        }

        let positions = job.tracker().snapshot();
        let resumed = self.create_with_positions(job.config().as_ref().clone(), positions)?;
        resumed.start(Arc::clone(&self.provider), &self.runtime()?)?;
        info!("scaling job {} resumed as job {}", job_id, resumed.id());

        Ok(resumed.id())
    }

    /// 所有作业的摘要，按 id 排序
    pub fn list(&self) -> Vec<JobSummary> {
        let jobs: Vec<Arc<Job>> = self.jobs.iter().map(|j| Arc::clone(j.value())).collect();
        let mut summaries: Vec<JobSummary> = jobs.iter().map(|j| j.summary()).collect();
        summaries.sort_by_key(|s| s.job_id);
        summaries
    }

    pub fn progress(&self, job_id: u64) -> CResult<JobProgress> {
        Ok(self.get(job_id)?.progress())
    }

    pub fn state(&self, job_id: u64) -> CResult<JobState> {
        Ok(self.get(job_id)?.state())
    }

    fn runtime(&self) -> CResult<Handle> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Handle::try_current()
                .map_err(|e| ReError::String(format!("no tokio runtime to run scaling tasks: {}", e))),
        }
    }

    pub fn get(&self, job_id: u64) -> CResult<Arc<Job>> {
        self.jobs
            .get(&job_id)
            .map(|j| Arc::clone(j.value()))
            .ok_or_else(|| ReError::NotFoundError(format!("Can't find scaling job id {}", job_id)))
    }

    /// 停止全部作业，服务关闭时调用
    pub async fn stop_all(&self) {
        let jobs: Vec<Arc<Job>> = self.jobs.iter().map(|j| Arc::clone(j.value())).collect();
        let stops = jobs.iter().map(|job| async move {
            if let Err(e) = job.stop().await {
                warn!("stop scaling job {} failed: {}", job.id(), e);
            }
        });
        join_all(stops).await;
        self.provider.close();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use common::err::scaling_error::ReError;
    use common::row::ColumnValue;
    use connection::memory::{Fault, MemoryDatabase};

    use crate::config::migration_config::MigrationConfig;
    use crate::job::job::JobState;
    use crate::job::job_manager::JobManager;

    /// 两个源库各一张分表，目标库一张表
    fn prepare(prefix: &str, rows: i64, incremental: bool) -> MigrationConfig {
        for ds in 0..2 {
            let name = format!("{}_ds_{}", prefix, ds);
            MemoryDatabase::drop_database(&name);
            let db = MemoryDatabase::open(&name);
            db.create_table("t_order", &["id", "status"], &["id"]).unwrap();
            for i in 0..rows {
                db.insert("t_order", vec![ColumnValue::Int(i * 2 + ds), ColumnValue::from("init")]).unwrap();
            }
        }
        let target = format!("{}_target", prefix);
        MemoryDatabase::drop_database(&target);
        MemoryDatabase::open(&target).create_table("t_order", &["id", "status"], &["id"]).unwrap();

        let json = format!(r#"{{
            "ruleConfiguration": {{
                "sourceDataSources": {{
                    "ds_0": {{"url": "memory://{p}_ds_0"}},
                    "ds_1": {{"url": "memory://{p}_ds_1"}}
                }},
                "targetDataSources": {{"target": {{"url": "memory://{p}_target"}}}},
                "shardingRule": {{"tables": {{"t_order": {{"actualDataNodes": "ds_${{0..1}}.t_order"}}}}}}
            }},
            "jobConfiguration": {{"batchSize": 4, "incremental": {inc}, "pollIntervalMs": 5}}
        }}"#, p = prefix, inc = incremental);
        serde_json::from_str(&json).unwrap()
    }

    async fn wait_state(manager: &JobManager, job_id: u64, state: JobState) {
        for _ in 0..300 {
            if manager.state(job_id).unwrap() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach {}", job_id, state);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_stop_lifecycle() {
        let manager = JobManager::default();
        let config = prepare("jm_lifecycle", 20, true);

        let job_id = manager.start_new(config).unwrap();
        assert_eq!(job_id, 1);
        assert_eq!(manager.state(job_id).unwrap(), JobState::Running);

        let progress = manager.progress(job_id).unwrap();
        assert_eq!(progress.tasks.len(), 2);

        // 只有 CREATED 的作业可以启动
        assert!(matches!(manager.start(job_id), Err(ReError::InvalidStateError(_))));

        manager.stop(job_id).await.unwrap();
        assert_eq!(manager.state(job_id).unwrap(), JobState::Stopped);
        // 重复 stop 成功且不改变状态
        manager.stop(job_id).await.unwrap();

        let job = manager.get(job_id).unwrap();
        assert_eq!(job.history(), vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);
        assert!(matches!(manager.start(job_id), Err(ReError::InvalidStateError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stop() {
        let manager = std::sync::Arc::new(JobManager::default());
        let job_id = manager.start_new(prepare("jm_concurrent_stop", 50, true)).unwrap();

        let mut handles = vec![];
        for _ in 0..4 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.stop(job_id).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let job = manager.get(job_id).unwrap();
        assert_eq!(job.state(), JobState::Stopped);
        assert_eq!(job.history(), vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dropped_stop_still_stops_job() {
        let manager = JobManager::default();
        let job_id = manager.start_new(prepare("jm_dropped_stop", 50, true)).unwrap();

        // stop 只被 poll 一次即被丢弃，如同客户端断开连接
        tokio::select! {
            biased;
            _ = manager.stop(job_id) => {}
            _ = std::future::ready(()) => {}
        }
        wait_state(&manager, job_id, JobState::Stopped).await;

        let again = tokio::time::timeout(Duration::from_secs(2), manager.stop(job_id)).await;
        assert!(matches!(again, Ok(Ok(()))));
        let job = manager.get(job_id).unwrap();
        assert_eq!(job.history(), vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);
        assert!(job.tasks().iter().all(|t| t.progress().status().is_terminal()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_inventory_only_job_stops_itself() {
        let manager = JobManager::default();
        let job_id = manager.start_new(prepare("jm_inventory_only", 10, false)).unwrap();
        wait_state(&manager, job_id, JobState::Stopped).await;

        assert_eq!(MemoryDatabase::open("jm_inventory_only_target").row_count("t_order").unwrap(), 20);
        let progress = manager.progress(job_id).unwrap();
        assert_eq!(progress.percent, 100);
        assert!(progress.tasks.iter().all(|t| t.status == "FINISHED"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_fault_fails_job() {
        let manager = JobManager::default();
        let config = prepare("jm_fault", 10, true);
        MemoryDatabase::open("jm_fault_target").inject_fault("t_order", Fault::Write).unwrap();

        let job_id = manager.start_new(config).unwrap();
        wait_state(&manager, job_id, JobState::Failed).await;

        let progress = manager.progress(job_id).unwrap();
        assert!(progress.failure.unwrap().contains("injected write fault"));
        // 所有任务都会退出
        for _ in 0..300 {
            if manager.progress(job_id).unwrap().tasks.iter().all(|t| t.status != "RUNNING") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(manager.progress(job_id).unwrap().tasks.iter().all(|t| t.status != "RUNNING"));

        // 失败作业 stop 为空操作
        manager.stop(job_id).await.unwrap();
        assert_eq!(manager.state(job_id).unwrap(), JobState::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resume_from_committed_positions() {
        let manager = JobManager::default();
        let config = prepare("jm_resume", 10, false);
        let target = MemoryDatabase::open("jm_resume_target");
        target.inject_fault("t_order", Fault::Write).unwrap();

        let job_id = manager.start_new(config).unwrap();
        wait_state(&manager, job_id, JobState::Failed).await;
        assert!(matches!(manager.resume(999), Err(ReError::NotFoundError(_))));

        target.clear_fault("t_order").unwrap();
        let resumed = manager.resume(job_id).unwrap();
        assert_ne!(resumed, job_id);
        wait_state(&manager, resumed, JobState::Stopped).await;
        assert_eq!(target.row_count("t_order").unwrap(), 20);
    }

    #[tokio::test]
    async fn test_unknown_and_created() {
        let manager = JobManager::default();
        match manager.progress(999) {
            Err(ReError::NotFoundError(reason)) => assert_eq!(reason, "Can't find scaling job id 999"),
            other => panic!("unexpected {:?}", other.map(|p| p.job_id)),
        }
        assert!(matches!(manager.stop(999).await, Err(ReError::NotFoundError(_))));

        let job = manager.create(prepare("jm_created", 1, true)).unwrap();
        assert_eq!(job.state(), JobState::Created);
        assert!(matches!(manager.resume(job.id()), Err(ReError::InvalidStateError(_))));
        manager.stop(job.id()).await.unwrap();
        assert_eq!(job.history(), vec![JobState::Created, JobState::Stopped]);
        assert_eq!(manager.list().len(), 1);
    }

    #[tokio::test]
    async fn test_configuration_error_not_registered() {
        let manager = JobManager::default();
        let mut config = prepare("jm_bad_config", 1, true);
        config.rule_configuration.source_data_sources.remove("ds_1");
        assert!(matches!(manager.create(config), Err(ReError::ConfigurationError(_))));
        assert!(manager.list().is_empty());
    }
}
