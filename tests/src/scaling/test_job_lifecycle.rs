use std::time::Duration;

use scaling::job::JobState;
use scaling::JobManager;

use crate::scaling::fixture::Shards;

async fn wait_state(manager: &JobManager, job_id: u64, state: JobState) -> bool {
    for _ in 0..500 {
        if manager.state(job_id).unwrap() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// 仅全量的作业在全部任务完成后自行停止
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inventory_job_stops_itself() {
    let shards = Shards::prepare("e2e_inv", 25, false);
    let manager = JobManager::default();

    let job_id = manager.start_new(shards.config()).unwrap();
    assert!(wait_state(&manager, job_id, JobState::Stopped).await);
    assert_eq!(shards.target.row_count("t_order").unwrap(), 50);

    let job = manager.get(job_id).unwrap();
    assert_eq!(job.history(), vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);
    let progress = manager.progress(job_id).unwrap();
    assert_eq!(progress.percent, 100);
    for task in &progress.tasks {
        assert!(task.committed_position.is_finished());
        assert_eq!(task.estimated_rows, 25);
        assert_eq!(task.inventory_imported, 25);
    }
}

/// 停止后续传，新作业从已提交的位点继续，目标端最终与源端一致
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_then_resume() {
    let shards = Shards::prepare("e2e_resume", 300, false);
    let manager = JobManager::default();

    let job_id = manager.start_new(shards.config()).unwrap();
    manager.stop(job_id).await.unwrap();
    assert_eq!(manager.state(job_id).unwrap(), JobState::Stopped);
    let copied = shards.target.row_count("t_order").unwrap();
    assert!(copied <= 600);

    let resumed = manager.resume(job_id).unwrap();
    assert_ne!(resumed, job_id);
    assert!(wait_state(&manager, resumed, JobState::Stopped).await);
    assert_eq!(shards.target.row_count("t_order").unwrap(), 600);

    let summaries = manager.list();
    assert_eq!(summaries.iter().map(|s| s.job_id).collect::<Vec<u64>>(), vec![job_id, resumed]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stop() {
    let shards = Shards::prepare("e2e_cstop", 50, true);
    let manager = std::sync::Arc::new(JobManager::default());
    let job_id = manager.start_new(shards.config()).unwrap();

    let stops: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.stop(job_id).await })
        })
        .collect();
    for stop in stops {
        assert!(tokio::time::timeout(Duration::from_secs(5), stop).await.unwrap().unwrap().is_ok());
    }

    assert_eq!(manager.state(job_id).unwrap(), JobState::Stopped);
    assert_eq!(manager.get(job_id).unwrap().history(),
               vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);
}
