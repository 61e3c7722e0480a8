use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::config::JobDefaults;
use connection::DataSourceConfig;

/// 顶层迁移配置，由控制面以 JSON 形式提交。创建作业后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    pub rule_configuration: RuleConfiguration,

    #[serde(default)]
    pub job_configuration: JobConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfiguration {
    /// 源端数据源，名称 -> 连接描述
    pub source_data_sources: BTreeMap<String, DataSourceConfig>,

    /// 目标端数据源，名称 -> 连接描述
    pub target_data_sources: BTreeMap<String, DataSourceConfig>,

    pub sharding_rule: ShardingRuleConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardingRuleConfiguration {
    /// 逻辑表 -> 分片规则
    pub tables: BTreeMap<String, TableRuleConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRuleConfiguration {
    /// 物理分片位置
    pub actual_data_nodes: DataNodes,

    /// 主键列，默认 ["id"]
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,

    /// 需要迁移的列，为空时迁移所有列
    #[serde(default)]
    pub columns: Option<Vec<String>>,

    /// 目标数据源名称。只有一个目标数据源时可省略
    #[serde(default)]
    pub target_data_source: Option<String>,

    /// 目标表名，默认与逻辑表同名
    #[serde(default)]
    pub target_table: Option<String>,
}

/// 物理分片位置：行表达式如 `ds_${0..1}.t_order_${0..1}`，或显式的 `数据源.表` 列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataNodes {
    Expression(String),
    List(Vec<String>),
}

/// 作业调优参数，未设置的项取服务端默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    /// 每批读取/写入的行数
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Dumper 与 Importer 之间的通道容量（批）
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    /// 未显式设置连接池大小的数据源使用的连接数
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// 全量完成后是否继续同步增量，默认 true
    #[serde(default)]
    pub incremental: Option<bool>,

    /// 增量无新数据时的轮询间隔
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

/// 合并默认值后的作业参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub pool_size: usize,
    pub incremental: bool,
    pub poll_interval_ms: u64,
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

impl JobConfiguration {
    pub fn resolve(&self, defaults: &JobDefaults) -> JobSettings {
        JobSettings {
            batch_size: self.batch_size.unwrap_or(defaults.batch_size).max(1),
            channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity).max(1),
            pool_size: self.concurrency.unwrap_or(defaults.pool_size).max(1),
            incremental: self.incremental.unwrap_or(true),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        }
    }
}
