use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use common::config::{DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_POOL_SIZE};
use common::err::scaling_error::ReError;
use common::err::CResult;

use crate::conn::datasource_config::{DataSourceConfig, DataSourceKey};
use crate::conn::driver::Driver;
use crate::memory::MemoryDriver;
use crate::mysql::MysqlDriver;
use crate::pool::{ConnectionPool, PoolStatus, PooledConnection};

/// 将数据源描述解析为可用连接。
///
/// 每个 (url, username, 最大连接数) 对应一个连接池，Dumper 与 Importer 以相同方式按批借用连接，批次结束即归还。
pub struct DataSourceProvider {
    drivers: DashMap<String, Arc<dyn Driver>>,

    pools: DashMap<DataSourceKey, Arc<ConnectionPool>>,

    default_pool_size: usize,

    default_acquire_timeout: Duration,
}

impl Default for DataSourceProvider {
    fn default() -> Self {
        DataSourceProvider::new(DEFAULT_POOL_SIZE, Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS))
    }
}

impl DataSourceProvider {
    /// 默认注册 memory 与 mysql 驱动
    pub fn new(default_pool_size: usize, default_acquire_timeout: Duration) -> Self {
        let provider = DataSourceProvider {
            drivers: DashMap::new(),
            pools: DashMap::new(),
            default_pool_size,
            default_acquire_timeout,
        };
        provider.register_driver(Arc::new(MemoryDriver::new()));
        provider.register_driver(Arc::new(MysqlDriver::new()));

        provider
    }

    pub fn register_driver(&self, driver: Arc<dyn Driver>) {
        info!("register data source driver: {}", driver.scheme());
        self.drivers.insert(driver.scheme().to_string(), driver);
    }

    /// 借出一个连接。连接在 PooledConnection 释放时归还连接池
    pub async fn get_connection(&self, config: &DataSourceConfig) -> CResult<PooledConnection> {
        let pool = self.get_pool(config)?;
        pool.acquire().await
    }

    pub fn pool_status(&self, config: &DataSourceConfig) -> Option<PoolStatus> {
        self.pools.get(&config.key()).map(|p| p.status())
    }

    /// 释放全部连接池。借出中的连接在归还后随池关闭
    pub fn close(&self) {
        self.pools.clear();
    }

    fn get_pool(&self, config: &DataSourceConfig) -> CResult<Arc<ConnectionPool>> {
        let key = config.key();
        if let Some(pool) = self.pools.get(&key) {
            return Ok(Arc::clone(pool.value()));
        }

        let scheme = config.scheme()?;
        let driver = self.drivers
            .get(scheme)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| ReError::ConnectionError(format!("no driver registered for scheme {}", scheme)))?;

        if self.pools.iter().any(|p| p.key().same_source(&key)) {
            warn!("data source {} already pooled with another size, open a separate pool of {:?}",
                key, config.pool.max_connections);
        }

        let pool = self.pools
            .entry(key)
            .or_insert_with(|| {
                info!("create connection pool for {:?}", config);
                Arc::new(ConnectionPool::new(config.clone(), driver, self.default_pool_size, self.default_acquire_timeout))
            })
            .clone();

        Ok(pool)
    }
}
