//! 内存数据源，连接串为 `memory://<database>`。
//!
//! 同名数据库在进程内共享，供本地演示与测试使用；支持按表注入读写故障、模拟连接断开。

mod database;
mod connection;

pub use connection::MemoryConnection;
pub use database::{Fault, MemoryDatabase};

use common::err::CResult;

use crate::conn::connection::IConnection;
use crate::conn::datasource_config::DataSourceConfig;
use crate::conn::driver::Driver;

pub const MEMORY_SCHEME: &str = "memory";

#[derive(Debug, Default)]
pub struct MemoryDriver {}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver {}
    }
}

#[async_trait::async_trait]
impl Driver for MemoryDriver {
    fn scheme(&self) -> &'static str {
        MEMORY_SCHEME
    }

    async fn connect(&self, config: &DataSourceConfig) -> CResult<Box<dyn IConnection>> {
        let db = MemoryDatabase::open(config.address()?);
        db.check_online()?;

        Ok(Box::new(MemoryConnection::new(db)))
    }
}
