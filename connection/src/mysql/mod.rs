//! MySQL 数据源，连接串为 `mysql://host:port/database`。
//!
//! 用户名与密码取自数据源描述，连接串中的同名参数会被覆盖。
//! 只提供全量读取与写入，没有变更日志。

mod connection;
mod sql;

pub use connection::MysqlConnection;

use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tracing::debug;

use common::err::scaling_error::ReError;
use common::err::CResult;

use crate::conn::connection::IConnection;
use crate::conn::datasource_config::DataSourceConfig;
use crate::conn::driver::Driver;

pub const MYSQL_SCHEME: &str = "mysql";

#[derive(Debug, Default)]
pub struct MysqlDriver {}

impl MysqlDriver {
    pub fn new() -> Self {
        MysqlDriver {}
    }

    pub(crate) fn connect_options(config: &DataSourceConfig) -> CResult<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::from_str(&config.url)
            .map_err(|e| ReError::ConnectionError(format!("malformed data source url {}: {}", config.url, e)))?;
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        Ok(options)
    }
}

#[async_trait::async_trait]
impl Driver for MysqlDriver {
    fn scheme(&self) -> &'static str {
        MYSQL_SCHEME
    }

    async fn connect(&self, config: &DataSourceConfig) -> CResult<Box<dyn IConnection>> {
        let address = config.address()?;
        let options = MysqlDriver::connect_options(config)?;
        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| ReError::ConnectionError(format!("connect to mysql {} failed: {}", address, e)))?;
        debug!("connected to mysql {}", address);

        Ok(Box::new(MysqlConnection::new(conn, address)))
    }
}
