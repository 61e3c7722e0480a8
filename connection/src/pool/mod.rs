use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, RunError};
use serde::Serialize;
use tracing::{debug, warn};

use common::err::scaling_error::ReError;
use common::err::CResult;

use crate::conn::connection::IConnection;
use crate::conn::datasource_config::{DataSourceConfig, DataSourceKey};
use crate::conn::driver::Driver;

/// 通过 Driver 建立连接的 bb8 连接管理器
pub struct DriverConnectionManager {
    key: DataSourceKey,

    config: DataSourceConfig,

    driver: Arc<dyn Driver>,
}

/// 池内保存的连接，broken 为 true 时归还即关闭
pub struct ManagedConnection {
    inner: Box<dyn IConnection>,

    broken: bool,
}

#[async_trait]
impl bb8::ManageConnection for DriverConnectionManager {
    type Connection = ManagedConnection;
    type Error = ReError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        debug!("pool {} open new connection", self.key);
        let inner = self.driver.connect(&self.config).await?;

        Ok(ManagedConnection { inner, broken: false })
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.inner.ping().await
    }

    /// 事务未结束或被标记为损坏的连接不再放回池中
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        let in_transaction = conn.inner.in_transaction();
        if conn.broken || in_transaction {
            warn!("pool {} close connection, broken: {}, in transaction: {}", self.key, conn.broken, in_transaction);
            return true;
        }
        false
    }
}

/// 单个数据源的连接池
pub struct ConnectionPool {
    key: DataSourceKey,

    pool: Pool<DriverConnectionManager>,

    max_connections: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_connections: usize,
    pub in_use: usize,
    pub idle: usize,
}

/// 从连接池借出的连接，Drop 时归还
pub struct PooledConnection {
    conn: bb8::PooledConnection<'static, DriverConnectionManager>,
}

impl ConnectionPool {
    pub fn new(config: DataSourceConfig, driver: Arc<dyn Driver>, default_size: usize, default_timeout: Duration) -> Self {
        let max_connections = config.pool.max_connections.unwrap_or(default_size).max(1);
        let acquire_timeout = config.pool.acquire_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);

        let key = config.key();
        let manager = DriverConnectionManager {
            key: key.clone(),
            config,
            driver,
        };
        // 连接失败直接返回给调用方，不在池内重试
        let pool = Pool::builder()
            .max_size(max_connections as u32)
            .connection_timeout(acquire_timeout)
            .retry_connection(false)
            .build_unchecked(manager);

        ConnectionPool {
            key,
            pool,
            max_connections,
        }
    }

    pub fn key(&self) -> &DataSourceKey {
        &self.key
    }

    /// 借出一个连接。连接数已达上限时等待，超时返回 PoolTimeout
    pub async fn acquire(&self) -> CResult<PooledConnection> {
        let conn = self.pool.get_owned().await.map_err(|e| match e {
            RunError::User(e) => e,
            RunError::TimedOut => ReError::PoolTimeout(self.key.to_string()),
        })?;

        Ok(PooledConnection { conn })
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        let connections = state.connections as usize;
        let idle = state.idle_connections as usize;

        PoolStatus {
            max_connections: self.max_connections,
            in_use: connections.saturating_sub(idle),
            idle,
        }
    }
}

impl PooledConnection {
    /// 标记连接已损坏，Drop 时关闭而不归还
    pub fn discard(&mut self) {
        self.conn.broken = true;
    }
}

impl Deref for PooledConnection {
    type Target = dyn IConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.inner.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.inner.as_mut()
    }
}
