use std::collections::BTreeMap;
use std::sync::Arc;

use common::log::init_test_log;
use common::row::ColumnValue;
use scaling::job::JobState;
use scaling::position::Position;
use scaling::{JobManager, TaskId};
use web::api::handler::{CommandRequest, HttpServerHandler};

use crate::scaling::fixture::{call, response, Shards};

/// 启动、查询进度、列表、停止的完整流程
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_progress_list_stop() {
    init_test_log();
    let shards = Shards::prepare("e2e_cs", 10, true);
    let handler = HttpServerHandler::new(Arc::new(JobManager::default()));

    let session = call(&handler, CommandRequest::post("/scaling/job/start", shards.config_json.clone())).await;
    let started = response(&session);
    assert!(started.is_success());
    assert_eq!(started.job_id(), Some(1));

    // 每个任务已提交的位点只增不减
    let mut last: BTreeMap<TaskId, Position> = BTreeMap::new();
    for _ in 0..20 {
        let session = call(&handler, CommandRequest::get("/scaling/job/progress/1")).await;
        let progress = response(&session).progress().unwrap().clone();
        assert_eq!(progress.tasks.len(), 2);
        for task in progress.tasks {
            if let Some(prev) = last.get(&task.task_id) {
                assert!(task.committed_position >= *prev, "{} went back from {} to {}",
                        task.task_id, prev, task.committed_position);
            }
            last.insert(task.task_id, task.committed_position);
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let session = call(&handler, CommandRequest::get("/scaling/job/list")).await;
    let jobs = response(&session).jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, 1);
    assert_eq!(jobs[0].state, JobState::Running);
    assert_eq!(jobs[0].task_count, 2);

    assert!(shards.wait_target_rows(20).await);

    // 增量阶段同步新增的行
    shards.sources[1].insert("t_order", vec![ColumnValue::Int(101), ColumnValue::Int(3), ColumnValue::from("new")]).unwrap();
    assert!(shards.wait_target_rows(21).await);

    let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 1}"#)).await;
    assert!(response(&session).is_success());

    let manager = handler.manager();
    assert_eq!(manager.state(1).unwrap(), JobState::Stopped);
    assert_eq!(manager.get(1).unwrap().history(),
               vec![JobState::Created, JobState::Running, JobState::Stopping, JobState::Stopped]);

    let session = call(&handler, CommandRequest::get("/scaling/job/progress/999")).await;
    let unknown = response(&session);
    assert!(!unknown.is_success());
    assert_eq!(unknown.reason(), Some("Can't find scaling job id 999"));
    assert_eq!(serde_json::to_value(unknown).unwrap(),
               serde_json::json!({"success": false, "reason": "Can't find scaling job id 999"}));

    // 第二次 stop 是无副作用的成功
    let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 1}"#)).await;
    assert!(response(&session).is_success());
    assert_eq!(manager.get(1).unwrap().history().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsupported_and_faults() {
    let handler = HttpServerHandler::new(Arc::new(JobManager::default()));

    let session = call(&handler, CommandRequest::new("DELETE", "/scaling/job/stop", vec![])).await;
    assert_eq!(response(&session).reason(), Some("Not support request!"));

    let session = call(&handler, CommandRequest::get("/scaling/job/progress/not_a_number")).await;
    assert!(session.closed);
    assert!(session.written.is_empty());

    let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"job": 1}"#)).await;
    assert!(session.closed);
}
