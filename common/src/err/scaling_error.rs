use std::io;
use std::num::ParseIntError;
use std::sync::PoisonError;

use thiserror::Error;

/// 迁移引擎统一异常。
///
/// 按照出错的路径划分为三类：
///   * 配置类：`ConfigurationError`，在创建作业时抛出，作业不会被注册；
///   * 任务类：`SourceReadError` / `TargetWriteError` / `StalePositionError`，由 Dumper/Importer 抛出，
///     会导致整个作业进入 FAILED；
///   * 控制类：`InvalidStateError` / `NotFoundError`，直接作为失败的命令响应返回，不修改任何状态。
#[derive(Debug, Error)]
pub enum ReError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),

    #[error("{0}")]
    String(String),

    #[error("config file parse error: {0}")]
    ConfigFileParseErr(String),

    #[error("serde error: {0}")]
    SerdeError(String),

    /// 分片规则、数据源引用等迁移配置错误
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// 源端读取失败（连接断开、表不存在等）
    #[error("source read error: {0}")]
    SourceReadError(String),

    /// 目标端写入失败（约束冲突、连接断开等）
    #[error("target write error: {0}")]
    TargetWriteError(String),

    /// 位点回退
    #[error("stale position for task {task_id}: offered {offered} is before {current}")]
    StalePositionError {
        task_id: String,
        current: String,
        offered: String,
    },

    #[error("invalid state: {0}")]
    InvalidStateError(String),

    #[error("{0}")]
    NotFoundError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    /// 连接池在超时时间内无法分配连接
    #[error("timed out acquiring a connection from pool {0}")]
    PoolTimeout(String),
}

impl ReError {
    /// 将任意异常归类为源端读取异常
    pub fn into_source_read(self) -> ReError {
        match self {
            e @ ReError::SourceReadError(_) => e,
            e @ ReError::StalePositionError { .. } => e,
            e => ReError::SourceReadError(e.to_string()),
        }
    }

    /// 将任意异常归类为目标端写入异常
    pub fn into_target_write(self) -> ReError {
        match self {
            e @ ReError::TargetWriteError(_) => e,
            e @ ReError::StalePositionError { .. } => e,
            e => ReError::TargetWriteError(e.to_string()),
        }
    }
}

impl From<ParseIntError> for ReError {
    fn from(error: ParseIntError) -> Self {
        ReError::String(error.to_string())
    }
}

impl From<serde_json::Error> for ReError {
    fn from(error: serde_json::Error) -> Self {
        ReError::SerdeError(error.to_string())
    }
}

impl From<serde_yaml::Error> for ReError {
    fn from(error: serde_yaml::Error) -> Self {
        ReError::SerdeError(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for ReError {
    fn from(error: PoisonError<T>) -> Self {
        ReError::String(error.to_string())
    }
}
