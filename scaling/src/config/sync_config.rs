use std::time::Duration;

use getset::Getters;

use connection::DataSourceConfig;

use crate::task::task_id::TaskId;

/// 单个同步任务的配置，由 ConfigTranslator 生成
#[derive(Debug, Clone, Getters)]
pub struct SyncTaskConfig {
    #[getset(get = "pub")]
    task_id: TaskId,

    #[getset(get = "pub")]
    dumper: DumperConfig,

    #[getset(get = "pub")]
    importer: ImporterConfig,

    // Dumper 与 Importer 之间的通道容量（批）
    #[getset(get = "pub")]
    channel_capacity: usize,
}

/// 增量同步方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementalMode {
    /// 仅全量，全量结束即任务完成
    Disabled,

    /// 全量结束后继续读取变更日志，直到作业停止
    ChangeLog { poll_interval: Duration },
}

/// 源端读取配置
#[derive(Debug, Clone, Getters)]
pub struct DumperConfig {
    #[getset(get = "pub")]
    data_source_name: String,

    #[getset(get = "pub")]
    data_source: DataSourceConfig,

    /// 物理表
    #[getset(get = "pub")]
    table: String,

    #[getset(get = "pub")]
    logical_table: String,

    #[getset(get = "pub")]
    columns: Option<Vec<String>>,

    #[getset(get = "pub")]
    primary_key: Vec<String>,

    #[getset(get = "pub")]
    batch_size: usize,

    #[getset(get = "pub")]
    incremental: IncrementalMode,
}

/// 目标端写入配置
#[derive(Debug, Clone, Getters)]
pub struct ImporterConfig {
    #[getset(get = "pub")]
    data_source_name: String,

    #[getset(get = "pub")]
    data_source: DataSourceConfig,

    #[getset(get = "pub")]
    table: String,

    #[getset(get = "pub")]
    primary_key: Vec<String>,

    #[getset(get = "pub")]
    batch_size: usize,
}

impl SyncTaskConfig {
    pub fn new(dumper: DumperConfig, importer: ImporterConfig, channel_capacity: usize) -> Self {
        SyncTaskConfig {
            task_id: TaskId::new(&dumper.data_source_name, &dumper.table),
            dumper,
            importer,
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl DumperConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(data_source_name: &str, data_source: DataSourceConfig, table: &str, logical_table: &str,
               columns: Option<Vec<String>>, primary_key: Vec<String>, batch_size: usize,
               incremental: IncrementalMode) -> Self {
        DumperConfig {
            data_source_name: data_source_name.to_string(),
            data_source,
            table: table.to_string(),
            logical_table: logical_table.to_string(),
            columns,
            primary_key,
            batch_size: batch_size.max(1),
            incremental,
        }
    }

    /// 全量扫描需要读取的列。列裁剪时补上主键列，保证可以按主键续读
    pub fn scan_columns(&self) -> Option<Vec<String>> {
        self.columns.as_ref().map(|columns| {
            let mut all = columns.clone();
            for pk in &self.primary_key {
                if !all.iter().any(|c| c.eq_ignore_ascii_case(pk)) {
                    all.push(pk.clone());
                }
            }
            all
        })
    }
}

impl ImporterConfig {
    pub fn new(data_source_name: &str, data_source: DataSourceConfig, table: &str,
               primary_key: Vec<String>, batch_size: usize) -> Self {
        ImporterConfig {
            data_source_name: data_source_name.to_string(),
            data_source,
            table: table.to_string(),
            primary_key,
            batch_size: batch_size.max(1),
        }
    }
}
