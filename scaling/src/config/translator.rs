use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use common::config::JobDefaults;
use common::err::scaling_error::ReError;
use common::err::CResult;
use connection::DataSourceConfig;

use crate::config::inline_expression::{expand, split_data_node};
use crate::config::migration_config::{DataNodes, JobSettings, MigrationConfig, TableRuleConfiguration};
use crate::config::sync_config::{DumperConfig, ImporterConfig, IncrementalMode, SyncTaskConfig};
use crate::task::task_id::TaskId;

/// 迁移配置 -> 同步任务配置。
///
/// 每个逻辑表的每个物理位置 (数据源, 表) 生成一个任务。输出顺序只取决于配置本身：
/// 逻辑表按名称排序，同一逻辑表内按分片表达式展开的顺序。
pub struct ConfigTranslator {
    defaults: JobDefaults,
}

impl Default for ConfigTranslator {
    fn default() -> Self {
        ConfigTranslator::new(JobDefaults::default())
    }
}

impl ConfigTranslator {
    pub fn new(defaults: JobDefaults) -> Self {
        ConfigTranslator {
            defaults,
        }
    }

    pub fn translate(&self, config: &MigrationConfig) -> CResult<Vec<SyncTaskConfig>> {
        let rule = &config.rule_configuration;
        if rule.sharding_rule.tables.is_empty() {
            return Err(ReError::ConfigurationError("sharding rule declares no table".to_string()));
        }

        let settings = config.job_configuration.resolve(&self.defaults);

        let mut seen = BTreeSet::new();
        let mut tasks = Vec::new();
        for (logical_table, table_rule) in &rule.sharding_rule.tables {
            let (target_name, target) = self.resolve_target(config, logical_table, table_rule)?;
            let target_table = table_rule.target_table.clone().unwrap_or_else(|| logical_table.clone());

            let nodes = data_nodes(&table_rule.actual_data_nodes)?;
            if nodes.is_empty() {
                return Err(ReError::ConfigurationError(format!(
                    "sharding rule yields no data node for table {}", logical_table)));
            }

            for node in nodes {
                let (ds_name, table) = split_data_node(&node)?;
                let source = rule.source_data_sources.get(&ds_name).ok_or_else(|| {
                    ReError::ConfigurationError(format!(
                        "table {} references unknown source data source {}", logical_table, ds_name))
                })?;

                let task_id = TaskId::new(&ds_name, &table);
                if !seen.insert(task_id.clone()) {
                    return Err(ReError::ConfigurationError(format!("data node {} declared more than once", task_id)));
                }

                let dumper = DumperConfig::new(&ds_name, self.pooled(source, &settings), &table, logical_table,
                                               table_rule.columns.clone(), table_rule.primary_key.clone(),
                                               settings.batch_size, incremental_mode(&settings));
                let importer = ImporterConfig::new(target_name, self.pooled(target, &settings), &target_table,
                                                   table_rule.primary_key.clone(), settings.batch_size);
                debug!("translate {} -> {}.{}", task_id, target_name, target_table);
                tasks.push(SyncTaskConfig::new(dumper, importer, settings.channel_capacity));
            }
        }

        Ok(tasks)
    }

    fn resolve_target<'a>(&self, config: &'a MigrationConfig, logical_table: &str,
                          table_rule: &TableRuleConfiguration) -> CResult<(&'a str, &'a DataSourceConfig)> {
        let targets = &config.rule_configuration.target_data_sources;
        match &table_rule.target_data_source {
            Some(name) => targets
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ReError::ConfigurationError(format!(
                    "table {} references unknown target data source {}", logical_table, name))),
            None if targets.len() == 1 => targets
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ReError::ConfigurationError("no target data source".to_string())),
            None => Err(ReError::ConfigurationError(format!(
                "table {} must name its target data source, {} are declared", logical_table, targets.len()))),
        }
    }

    fn pooled(&self, config: &DataSourceConfig, settings: &JobSettings) -> DataSourceConfig {
        let mut config = config.clone().with_default_pool_size(settings.pool_size);
        if config.pool.acquire_timeout_ms.is_none() {
            config.pool.acquire_timeout_ms = Some(self.defaults.acquire_timeout_ms);
        }
        config
    }
}

fn data_nodes(nodes: &DataNodes) -> CResult<Vec<String>> {
    match nodes {
        DataNodes::Expression(expr) => expand(expr),
        DataNodes::List(list) => {
            let mut all = Vec::new();
            for expr in list {
                all.extend(expand(expr)?);
            }
            Ok(all)
        }
    }
}

fn incremental_mode(settings: &JobSettings) -> IncrementalMode {
    if settings.incremental {
        IncrementalMode::ChangeLog { poll_interval: Duration::from_millis(settings.poll_interval_ms) }
    } else {
        IncrementalMode::Disabled
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use rand::Rng;

    use common::err::scaling_error::ReError;

    use crate::config::migration_config::MigrationConfig;
    use crate::config::sync_config::IncrementalMode;
    use crate::config::translator::ConfigTranslator;

    fn config(tables: &str, targets: &str, job: &str) -> MigrationConfig {
        let json = format!(r#"{{
            "ruleConfiguration": {{
                "sourceDataSources": {{
                    "ds_0": {{"url": "memory://tr_ds_0"}},
                    "ds_1": {{"url": "memory://tr_ds_1", "pool": {{"maxConnections": 1}}}}
                }},
                "targetDataSources": {},
                "shardingRule": {{"tables": {}}}
            }},
            "jobConfiguration": {}
        }}"#, targets, tables, job);
        serde_json::from_str(&json).unwrap()
    }

    const TARGET: &str = r#"{"target": {"url": "memory://tr_target"}}"#;

    #[test]
    fn test_translate_expression() {
        let c = config(r#"{"t_order": {"actualDataNodes": "ds_${0..1}.t_order_${0..1}"}}"#, TARGET, r#"{"concurrency": 2}"#);
        let tasks = ConfigTranslator::default().translate(&c).unwrap();

        let ids: Vec<&str> = tasks.iter().map(|t| t.task_id().as_str()).collect();
        assert_eq!(ids, vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]);

        let first = &tasks[0];
        assert_eq!(first.dumper().logical_table(), "t_order");
        assert_eq!(first.importer().table(), "t_order");
        assert_eq!(first.importer().data_source_name(), "target");
        assert_eq!(first.dumper().data_source().pool.max_connections, Some(2));
        // 显式设置的连接池大小不被覆盖
        assert_eq!(tasks[2].dumper().data_source().pool.max_connections, Some(1));
        assert!(matches!(first.dumper().incremental(), IncrementalMode::ChangeLog { .. }));

        // 相同输入得到相同输出
        let again = ConfigTranslator::default().translate(&c).unwrap();
        let again_ids: Vec<&str> = again.iter().map(|t| t.task_id().as_str()).collect();
        assert_eq!(ids, again_ids);
    }

    #[test]
    fn test_single_placement() {
        let c = config(r#"{"t_user": {"actualDataNodes": ["ds_1.t_user"], "targetTable": "t_user_new"}}"#,
                       TARGET, r#"{"incremental": false}"#);
        let tasks = ConfigTranslator::default().translate(&c).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].importer().table(), "t_user_new");
        assert_eq!(*tasks[0].dumper().incremental(), IncrementalMode::Disabled);
    }

    #[test]
    fn test_configuration_errors() {
        let translator = ConfigTranslator::default();
        let cases = vec![
            // 未知源数据源
            config(r#"{"t_order": {"actualDataNodes": "ds_2.t_order"}}"#, TARGET, "{}"),
            // 没有表
            config("{}", TARGET, "{}"),
            // 位置重复
            config(r#"{"a": {"actualDataNodes": "ds_0.t"}, "b": {"actualDataNodes": "ds_0.t"}}"#, TARGET, "{}"),
            // 多个目标数据源但未指定
            config(r#"{"t_order": {"actualDataNodes": "ds_0.t_order"}}"#,
                   r#"{"t1": {"url": "memory://t1"}, "t2": {"url": "memory://t2"}}"#, "{}"),
            // 未知目标数据源
            config(r#"{"t_order": {"actualDataNodes": "ds_0.t_order", "targetDataSource": "t3"}}"#, TARGET, "{}"),
            // 空列表
            config(r#"{"t_order": {"actualDataNodes": []}}"#, TARGET, "{}"),
        ];

        for c in cases {
            assert!(matches!(translator.translate(&c), Err(ReError::ConfigurationError(_))), "{:?}", c);
        }
    }

    #[test]
    fn test_partitions_disjoint_and_cover_tables() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let table_count = rng.gen_range(1..5);
            let mut tables = Vec::new();
            for t in 0..table_count {
                let shards = rng.gen_range(0..4);
                tables.push(format!(r#""t_{}": {{"actualDataNodes": "ds_${{0..1}}.t_{}_${{0..{}}}"}}"#, t, t, shards));
            }
            let c = config(&format!("{{{}}}", tables.join(",")), TARGET, "{}");
            let tasks = ConfigTranslator::default().translate(&c).unwrap();

            let placements: BTreeSet<(String, String)> = tasks
                .iter()
                .map(|t| (t.dumper().data_source_name().clone(), t.dumper().table().clone()))
                .collect();
            assert_eq!(placements.len(), tasks.len());

            let covered: BTreeSet<&String> = tasks.iter().map(|t| t.dumper().logical_table()).collect();
            assert_eq!(covered.len(), table_count);
        }
    }
}
