use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use common::err::scaling_error::ReError;
use common::err::CResult;
use common::row::{PrimaryKey, Row};
use connection::conn::connection::ScanQuery;

use crate::config::sync_config::IncrementalMode;
use crate::dumper::{push, DumpOutcome, Dumper, DumperContext, Push};
use crate::position::{Checkpoint, Position};
use crate::record::{DataRecord, RecordBatch};
use crate::task::signal::StopSignal;

/// 全量读取：按主键升序分批扫描源表，扫描结束后发出阶段切换的空批次
pub struct InventoryDumper {
    ctx: DumperContext,
}

impl InventoryDumper {
    pub fn new(ctx: DumperContext) -> Self {
        InventoryDumper {
            ctx,
        }
    }

    /// 全量开始时记录变更日志位置与源表行数
    async fn prepare(&self) -> CResult<(u64, u64)> {
        let config = &self.ctx.config;
        let mut conn = self.ctx.provider.get_connection(config.data_source()).await?;
        let log_start = conn.log_head().await?;
        let rows = conn.count_rows(config.table()).await?;

        Ok((log_start, rows))
    }

    async fn scan(&self, after: Option<PrimaryKey>) -> CResult<Vec<Row>> {
        let config = &self.ctx.config;
        let query = ScanQuery {
            columns: config.scan_columns(),
            after,
            limit: *config.batch_size(),
        };

        // 连接只在本批读取期间持有
        let mut conn = self.ctx.provider.get_connection(config.data_source()).await?;
        conn.scan(config.table(), &query).await
    }
}

#[async_trait::async_trait]
impl Dumper for InventoryDumper {
    async fn dump(&mut self, start: Position, channel: &Sender<RecordBatch>, signal: &mut StopSignal) -> CResult<DumpOutcome> {
        let config = &self.ctx.config;
        let progress = &self.ctx.progress;

        let (log_start, estimated) = self.prepare().await.map_err(ReError::into_source_read)?;
        let (log_start, mut last_key) = match start.checkpoint() {
            Checkpoint::Init => (log_start, None),
            Checkpoint::Inventory { log_start, last_key } => (*log_start, last_key.clone()),
            _ => return Ok(DumpOutcome::Exhausted(start)),
        };
        progress.set_estimated_rows(estimated);
        info!("inventory dump {}.{} from {}, about {} rows",
            config.data_source_name(), config.table(), start, estimated);

        let mut position = start;
        loop {
            if signal.is_stopped() {
                return Ok(DumpOutcome::Stopped(position));
            }

            let rows = self.scan(last_key.clone()).await.map_err(ReError::into_source_read)?;
            let exhausted = rows.len() < *config.batch_size();

            if !rows.is_empty() {
                let mut next = position.clone();
                let mut records = Vec::with_capacity(rows.len());
                for row in rows {
                    let key = row.key(config.primary_key()).map_err(ReError::into_source_read)?;
                    next = next.advance(Checkpoint::Inventory { log_start, last_key: Some(key.clone()) });
                    records.push(DataRecord::inventory(key, row, next.clone()));
                }

                let count = records.len() as u64;
                let batch_key = records.last().map(|r| r.key.clone());
                match push(channel, signal, RecordBatch::new(records, next.clone())).await {
                    Push::Accepted => {
                        debug!("inventory dump {} accepted {} rows, position {}", config.table(), count, next);
                        progress.add_inventory_dumped(count);
                        progress.set_dumped_position(next.clone());
                        position = next;
                        last_key = batch_key;
                    }
                    Push::Stopped => return Ok(DumpOutcome::Stopped(position)),
                    Push::Closed => return Ok(DumpOutcome::ChannelClosed(position)),
                }
            }

            if exhausted {
                break;
            }
        }

        let next = match config.incremental() {
            IncrementalMode::Disabled => position.advance(Checkpoint::Finished),
            IncrementalMode::ChangeLog { .. } => position.advance(Checkpoint::Incremental { offset: log_start }),
        };
        match push(channel, signal, RecordBatch::marker(next.clone())).await {
            Push::Accepted => {
                info!("inventory dump {}.{} finished at {}", config.data_source_name(), config.table(), next);
                progress.set_dumped_position(next.clone());
                Ok(DumpOutcome::Exhausted(next))
            }
            Push::Stopped => Ok(DumpOutcome::Stopped(position)),
            Push::Closed => Ok(DumpOutcome::ChannelClosed(position)),
        }
    }
}
