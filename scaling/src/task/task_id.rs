use std::fmt;

use serde::{Deserialize, Serialize};

/// 同步任务标识，形如 `<数据源>.<物理表>`。
///
/// 由分片位置唯一确定，同一迁移配置重建作业时保持不变，续传依赖于此。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(data_source: &str, table: &str) -> Self {
        TaskId(format!("{}.{}", data_source, table))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}
