use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::row::ColumnValue;
use connection::memory::MemoryDatabase;
use scaling::MigrationConfig;
use web::api::handler::{CommandRequest, HttpServerHandler, Session};
use web::api::result::R;
use web::web_error::{WResult, WebError};

/// 一张逻辑表 t_order 拆在两个源库上，迁移到一个目标库。 源库 ds_n 中的 id 满足 id % 2 == n
pub struct Shards {
    pub sources: Vec<Arc<MemoryDatabase>>,

    pub target: Arc<MemoryDatabase>,

    pub config_json: String,
}

impl Shards {
    pub fn prepare(prefix: &str, rows_per_shard: i64, incremental: bool) -> Shards {
        let mut sources = vec![];
        for ds in 0..2 {
            let name = format!("{}_ds_{}", prefix, ds);
            MemoryDatabase::drop_database(&name);
            let db = MemoryDatabase::open(&name);
            db.create_table("t_order", &["id", "user_id", "status"], &["id"]).unwrap();
            for i in 0..rows_per_shard {
                let id = i * 2 + ds;
                db.insert("t_order", vec![ColumnValue::Int(id), ColumnValue::Int(id % 7), ColumnValue::from("init")]).unwrap();
            }
            sources.push(db);
        }

        let target_name = format!("{}_target", prefix);
        MemoryDatabase::drop_database(&target_name);
        let target = MemoryDatabase::open(&target_name);
        target.create_table("t_order", &["id", "user_id", "status"], &["id"]).unwrap();

        let config_json = format!(r#"{{
            "ruleConfiguration": {{
                "sourceDataSources": {{
                    "ds_0": {{"url": "memory://{p}_ds_0"}},
                    "ds_1": {{"url": "memory://{p}_ds_1"}}
                }},
                "targetDataSources": {{"target": {{"url": "memory://{p}_target"}}}},
                "shardingRule": {{"tables": {{"t_order": {{"actualDataNodes": "ds_${{0..1}}.t_order"}}}}}}
            }},
            "jobConfiguration": {{"batchSize": 3, "channelCapacity": 2, "incremental": {inc}, "pollIntervalMs": 5}}
        }}"#, p = prefix, inc = incremental);

        Shards {
            sources,
            target,
            config_json,
        }
    }

    pub fn config(&self) -> MigrationConfig {
        serde_json::from_str(&self.config_json).unwrap()
    }

    /// 等待目标表行数达到 rows
    pub async fn wait_target_rows(&self, rows: usize) -> bool {
        for _ in 0..500 {
            if self.target.row_count("t_order").unwrap() == rows {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// 记录写出的响应与关闭动作
#[derive(Default)]
pub struct RecordingSession {
    pub written: Vec<R>,

    pub closed: bool,
}

#[async_trait]
impl Session for RecordingSession {
    async fn write_and_flush(&mut self, response: R) -> WResult<()> {
        if self.closed {
            return Err(WebError::Closed);
        }
        self.written.push(response);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

pub async fn call(handler: &HttpServerHandler, request: CommandRequest) -> RecordingSession {
    let mut session = RecordingSession::default();
    handler.channel_read(&mut session, request).await;
    session
}

/// 唯一的响应
pub fn response(session: &RecordingSession) -> &R {
    assert!(!session.closed, "session closed unexpectedly");
    assert_eq!(session.written.len(), 1);
    &session.written[0]
}
