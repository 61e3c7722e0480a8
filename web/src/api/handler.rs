use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use scaling::{JobManager, MigrationConfig};

use crate::api::result::R;
use crate::web_error::{WResult, WebError};

pub const START_URI: &str = "/scaling/job/start";
pub const STOP_URI: &str = "/scaling/job/stop";
pub const RESUME_URI: &str = "/scaling/job/resume";
pub const LIST_URI: &str = "/scaling/job/list";
pub const PROGRESS_URI_PREFIX: &str = "/scaling/job/progress/";

pub const NOT_SUPPORT: &str = "Not support request!";

/// 与传输无关的请求
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub method: String,

    /// 路径，可以带查询串
    pub uri: String,

    pub body: Vec<u8>,
}

impl CommandRequest {
    pub fn new(method: &str, uri: &str, body: Vec<u8>) -> Self {
        CommandRequest {
            method: method.to_ascii_uppercase(),
            uri: uri.to_string(),
            body,
        }
    }

    pub fn get(uri: &str) -> Self {
        CommandRequest::new("GET", uri, Vec::new())
    }

    pub fn post(uri: &str, body: impl Into<Vec<u8>>) -> Self {
        CommandRequest::new("POST", uri, body.into())
    }

    /// 去掉查询串与末尾的 '/'
    fn path(&self) -> &str {
        let path = self.uri.split('?').next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        }
    }
}

/// 承载一次命令的会话。 写出响应或关闭，二者之一。
#[async_trait]
pub trait Session: Send {
    async fn write_and_flush(&mut self, response: R) -> WResult<()>;

    async fn close(&mut self);
}

#[derive(Debug, Deserialize)]
struct JobIdRequest {
    id: u64,
}

/// 把命令翻译为 JobManager 调用，把结果翻译为响应。
///
/// 作业引擎的异常转换为 `{success:false, reason}`；请求本身无法处理时（请求体非法、
/// id 不是数字、写出失败）关闭会话，不返回残缺的响应。
pub struct HttpServerHandler {
    manager: Arc<JobManager>,
}

impl HttpServerHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        HttpServerHandler {
            manager,
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    pub async fn channel_read<S: Session + ?Sized>(&self, session: &mut S, request: CommandRequest) {
        let rs = match self.handle(&request).await {
            Ok(response) => session.write_and_flush(response).await,
            Err(e) => Err(e),
        };

        if let Err(e) = rs {
            self.exception_caught(session, &request, e).await;
        }
    }

    pub async fn exception_caught<S: Session + ?Sized>(&self, session: &mut S, request: &CommandRequest, err: WebError) {
        error!("{} {} failed, close session: {}", request.method, request.uri, err);
        session.close().await;
    }

    pub async fn handle(&self, request: &CommandRequest) -> WResult<R> {
        let path = request.path();
        debug!("receive {} {}", request.method, path);

        let response = match (request.method.as_str(), path) {
            ("POST", START_URI) => {
                let config: MigrationConfig = serde_json::from_slice(&request.body)?;
                match self.manager.start_new(config) {
                    Ok(job_id) => R::success_with_job_id(job_id),
                    Err(e) => R::failure(&e.to_string()),
                }
            }
            ("POST", STOP_URI) => {
                let req: JobIdRequest = serde_json::from_slice(&request.body)?;
                match self.manager.stop(req.id).await {
                    Ok(()) => R::success(),
                    Err(e) => R::failure(&e.to_string()),
                }
            }
            ("POST", RESUME_URI) => {
                let req: JobIdRequest = serde_json::from_slice(&request.body)?;
                match self.manager.resume(req.id) {
                    Ok(job_id) => R::success_with_job_id(job_id),
                    Err(e) => R::failure(&e.to_string()),
                }
            }
            ("GET", LIST_URI) => R::with_jobs(self.manager.list()),
            ("GET", p) if p.starts_with(PROGRESS_URI_PREFIX) => {
                let job_id = p[PROGRESS_URI_PREFIX.len()..].parse::<u64>()?;
                match self.manager.progress(job_id) {
                    Ok(progress) => R::with_progress(progress),
                    Err(e) => R::failure(&e.to_string()),
                }
            }
            _ => R::failure(NOT_SUPPORT),
        };

        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use common::row::ColumnValue;
    use connection::memory::MemoryDatabase;
    use scaling::job::JobState;
    use scaling::JobManager;

    use crate::api::handler::{CommandRequest, HttpServerHandler, Session};
    use crate::api::result::R;
    use crate::web_error::{WResult, WebError};

    #[derive(Default)]
    struct MockSession {
        written: Vec<R>,
        closed: bool,
        fail_write: bool,
    }

    #[async_trait]
    impl Session for MockSession {
        async fn write_and_flush(&mut self, response: R) -> WResult<()> {
            if self.fail_write {
                return Err(WebError::Closed);
            }
            self.written.push(response);
            Ok(())
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    impl MockSession {
        fn only(&self) -> &R {
            assert!(!self.closed);
            assert_eq!(self.written.len(), 1);
            &self.written[0]
        }
    }

    fn handler() -> HttpServerHandler {
        HttpServerHandler::new(Arc::new(JobManager::default()))
    }

    async fn call(handler: &HttpServerHandler, request: CommandRequest) -> MockSession {
        let mut session = MockSession::default();
        handler.channel_read(&mut session, request).await;
        session
    }

    fn migration_config(prefix: &str) -> String {
        for ds in 0..2 {
            let name = format!("{}_ds_{}", prefix, ds);
            MemoryDatabase::drop_database(&name);
            let db = MemoryDatabase::open(&name);
            db.create_table("t_order", &["id", "status"], &["id"]).unwrap();
            for i in 0..5 {
                db.insert("t_order", vec![ColumnValue::Int(i * 2 + ds), ColumnValue::from("init")]).unwrap();
            }
        }
        let target = format!("{}_target", prefix);
        MemoryDatabase::drop_database(&target);
        MemoryDatabase::open(&target).create_table("t_order", &["id", "status"], &["id"]).unwrap();

        format!(r#"{{
            "ruleConfiguration": {{
                "sourceDataSources": {{
                    "ds_0": {{"url": "memory://{p}_ds_0"}},
                    "ds_1": {{"url": "memory://{p}_ds_1"}}
                }},
                "targetDataSources": {{"target": {{"url": "memory://{p}_target"}}}},
                "shardingRule": {{"tables": {{"t_order": {{"actualDataNodes": "ds_${{0..1}}.t_order"}}}}}}
            }},
            "jobConfiguration": {{"batchSize": 2, "pollIntervalMs": 5}}
        }}"#, p = prefix)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_list_progress_stop() {
        let handler = handler();

        let session = call(&handler, CommandRequest::post("/scaling/job/start", migration_config("h_life"))).await;
        assert!(session.only().is_success());
        assert_eq!(session.only().job_id(), Some(1));

        let session = call(&handler, CommandRequest::get("/scaling/job/progress/1")).await;
        let progress = session.only().progress().unwrap();
        assert_eq!(progress.tasks.len(), 2);

        let session = call(&handler, CommandRequest::get("/scaling/job/list")).await;
        let jobs = session.only().jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, 1);
        assert_eq!(jobs[0].state, JobState::Running);

        let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 1}"#)).await;
        assert!(session.only().is_success());
        assert_eq!(handler.manager().state(1).unwrap(), JobState::Stopped);

        // 重复 stop 依旧成功
        let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 1}"#)).await;
        assert!(session.only().is_success());

        let json = serde_json::to_value(session.only()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resume() {
        let handler = handler();
        call(&handler, CommandRequest::post("/scaling/job/start", migration_config("h_resume"))).await;

        // 运行中的作业不能续传
        let session = call(&handler, CommandRequest::post("/scaling/job/resume", r#"{"id": 1}"#)).await;
        assert!(!session.only().is_success());

        call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 1}"#)).await;
        let session = call(&handler, CommandRequest::post("/scaling/job/resume", r#"{"id": 1}"#)).await;
        assert_eq!(session.only().job_id(), Some(2));

        tokio::time::timeout(Duration::from_secs(5), handler.manager().stop_all()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let handler = handler();

        let session = call(&handler, CommandRequest::get("/scaling/job/progress/999")).await;
        assert!(!session.only().is_success());
        assert_eq!(session.only().reason(), Some("Can't find scaling job id 999"));

        let session = call(&handler, CommandRequest::post("/scaling/job/stop", r#"{"id": 7}"#)).await;
        assert_eq!(session.only().reason(), Some("Can't find scaling job id 7"));
    }

    #[tokio::test]
    async fn test_not_support() {
        let handler = handler();
        for request in [
            CommandRequest::new("DELETE", "/scaling/job/stop", vec![]),
            CommandRequest::get("/scaling/job/start"),
            CommandRequest::post("/scaling/job/list", ""),
            CommandRequest::get("/scaling/job/unknown"),
            CommandRequest::get("/"),
        ] {
            let session = call(&handler, request).await;
            assert_eq!(session.only().reason(), Some("Not support request!"));
        }
    }

    #[tokio::test]
    async fn test_path_normalized() {
        let handler = handler();
        let session = call(&handler, CommandRequest::get("/scaling/job/list/?verbose=true")).await;
        assert!(session.only().is_success());
        assert_eq!(session.only().jobs().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_fault_closes_session() {
        let handler = handler();

        let session = call(&handler, CommandRequest::post("/scaling/job/start", "{not json")).await;
        assert!(session.closed);
        assert!(session.written.is_empty());

        let session = call(&handler, CommandRequest::get("/scaling/job/progress/abc")).await;
        assert!(session.closed);

        let mut session = MockSession { fail_write: true, ..Default::default() };
        handler.channel_read(&mut session, CommandRequest::get("/scaling/job/list")).await;
        assert!(session.closed);
    }

    #[tokio::test]
    async fn test_configuration_error_is_failure() {
        let handler = handler();
        let body = r#"{"ruleConfiguration": {"sourceDataSources": {}, "targetDataSources": {}, "shardingRule": {"tables": {}}}}"#;
        let session = call(&handler, CommandRequest::post("/scaling/job/start", body)).await;
        assert!(!session.only().is_success());
        assert!(session.only().reason().unwrap().starts_with("configuration error"));
        assert!(handler.manager().list().is_empty());
    }
}
