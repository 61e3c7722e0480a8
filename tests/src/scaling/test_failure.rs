use std::time::Duration;

use connection::memory::Fault;
use scaling::job::JobState;
use scaling::JobManager;

use crate::scaling::fixture::Shards;

async fn wait_terminal(manager: &JobManager, job_id: u64) -> JobState {
    for _ in 0..500 {
        let state = manager.state(job_id).unwrap();
        if state.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    manager.state(job_id).unwrap()
}

/// 目标端写入失败使作业进入 FAILED，其它任务随之停止
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_fault_fails_job() {
    let shards = Shards::prepare("e2e_wfault", 20, true);
    shards.target.inject_fault("t_order", Fault::Write).unwrap();
    let manager = JobManager::default();

    let job_id = manager.start_new(shards.config()).unwrap();
    assert_eq!(wait_terminal(&manager, job_id).await, JobState::Failed);

    let progress = manager.progress(job_id).unwrap();
    assert!(progress.failure.unwrap().contains("injected write fault"));

    // 所有任务都已退出
    let mut exited = false;
    for _ in 0..200 {
        let tasks = manager.progress(job_id).unwrap().tasks;
        if tasks.iter().all(|t| t.status == "FAILED" || t.status == "STOPPED") {
            exited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(exited);

    // 已失败的作业 stop 是无副作用的成功
    manager.stop(job_id).await.unwrap();
    assert_eq!(manager.state(job_id).unwrap(), JobState::Failed);

    // 排除故障后续传
    shards.target.clear_fault("t_order").unwrap();
    let resumed = manager.resume(job_id).unwrap();
    assert!(shards.wait_target_rows(40).await);
    manager.stop(resumed).await.unwrap();
    assert_eq!(manager.state(resumed).unwrap(), JobState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_fault_fails_job() {
    let shards = Shards::prepare("e2e_rfault", 20, false);
    shards.sources[1].inject_fault("t_order", Fault::Read).unwrap();
    let manager = JobManager::default();

    let job_id = manager.start_new(shards.config()).unwrap();
    assert_eq!(wait_terminal(&manager, job_id).await, JobState::Failed);
    let failure = manager.get(job_id).unwrap().failure().unwrap();
    assert!(failure.contains("ds_1.t_order"));
    assert!(failure.contains("source read error"));
}

#[tokio::test]
async fn test_bad_configuration_not_registered() {
    let shards = Shards::prepare("e2e_badcfg", 1, false);
    let mut config = shards.config();
    config.rule_configuration.sharding_rule.tables.clear();
    let manager = JobManager::default();

    assert!(manager.start_new(config).is_err());
    assert!(manager.list().is_empty());
    assert!(manager.progress(1).is_err());
}
