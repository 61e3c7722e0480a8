use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::scaling_error::ReError;
use crate::err::CResult;

pub mod load_style;

/// 默认每批读取/写入的行数
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// 默认通道容量（单位：批）
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// 默认每个数据源的连接池大小
pub const DEFAULT_POOL_SIZE: usize = 4;

/// 增量阶段无新变更时的轮询间隔
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// scaling 服务端配置， 对应 conf/scaling.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub log: LogConfig,
    pub job: JobDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// actix worker 数量
    pub workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
    /// 日志过滤表达式，如 "info,scaling=debug"。 为空时由 debug 决定级别
    pub level: Option<String>,
    /// 日志目录。为空时仅输出到控制台
    pub log_dir: Option<String>,
}

/// 作业调优参数的默认值。迁移配置中未指定的项使用这里的值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDefaults {
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 8888,
            workers: 2,
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        JobDefaults {
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            pool_size: DEFAULT_POOL_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl LogConfig {
    pub fn get_log_dir(&self) -> Option<String> {
        self.log_dir.clone().filter(|d| !d.is_empty())
    }
}

pub fn read_config<P: AsRef<Path>>(path: P) -> CResult<ServerConfig> {
    let mut file = File::open(path.as_ref())?;
    let mut s = String::new();
    file.read_to_string(&mut s)?;

    parse_config(&s)
}

pub fn parse_config(s: &str) -> CResult<ServerConfig> {
    toml::from_str(s)
        .map_err(|e| ReError::ConfigFileParseErr(e.to_string()))
}
