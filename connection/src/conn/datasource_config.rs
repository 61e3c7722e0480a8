use std::fmt;

use serde::{Deserialize, Serialize};

use common::err::scaling_error::ReError;
use common::err::CResult;

use crate::SCHEME_SEPARATOR;

/// 数据源描述：连接参数 + 连接池设置。
///
/// 连接池按 (url, username, 最大连接数) 复用，密码不参与池的标识。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    /// 连接串，如 memory://ds_0
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub pool: PoolOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolOptions {
    /// 最大连接数
    pub max_connections: Option<usize>,

    /// 获取连接的超时时间
    pub acquire_timeout_ms: Option<u64>,
}

/// 连接池标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataSourceKey {
    url: String,
    username: String,
    // 同一数据源上不同并发度的作业各自建池
    max_connections: Option<usize>,
}

// 不输出密码
impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("pool", &self.pool)
            .finish()
    }
}

impl DataSourceKey {
    /// 是否指向同一数据源，不比较连接池大小
    pub fn same_source(&self, other: &DataSourceKey) -> bool {
        self.url == other.url && self.username == other.username
    }
}

impl fmt::Display for DataSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.username.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}@{}", self.username, self.url)
        }
    }
}

impl DataSourceConfig {
    pub fn new(url: &str) -> Self {
        DataSourceConfig::new_with_auth(url, "", "")
    }

    pub fn new_with_auth(url: &str, username: &str, password: &str) -> Self {
        DataSourceConfig {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            pool: PoolOptions::default(),
        }
    }

    pub fn key(&self) -> DataSourceKey {
        DataSourceKey {
            url: self.url.clone(),
            username: self.username.clone(),
            max_connections: self.pool.max_connections,
        }
    }

    /// 连接串的协议部分
    pub fn scheme(&self) -> CResult<&str> {
        self.url
            .split_once(SCHEME_SEPARATOR)
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
            .ok_or_else(|| ReError::ConnectionError(format!("malformed data source url: {}", self.url)))
    }

    /// 连接串协议之后的部分
    pub fn address(&self) -> CResult<&str> {
        self.url
            .split_once(SCHEME_SEPARATOR)
            .map(|(_, address)| address)
            .filter(|address| !address.is_empty())
            .ok_or_else(|| ReError::ConnectionError(format!("malformed data source url: {}", self.url)))
    }

    /// 未显式设置连接池大小时使用 default_size
    pub fn with_default_pool_size(mut self, default_size: usize) -> Self {
        if self.pool.max_connections.is_none() {
            self.pool.max_connections = Some(default_size);
        }
        self
    }
}
