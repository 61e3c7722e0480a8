use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use common::err::scaling_error::ReError;
use common::err::CResult;
use connection::{DataSourceProvider, PooledConnection};

use crate::config::sync_config::ImporterConfig;
use crate::position::{Position, PositionTracker};
use crate::record::{DataRecord, RecordBatch, RecordOp};
use crate::task::progress::TaskProgress;
use crate::task::signal::StopSignal;
use crate::task::task_id::TaskId;

/// Importer 的结束方式，携带最后一次提交的位点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// 上游关闭了通道，已收到的批次全部提交
    Drained(Position),

    /// 收到停止信号
    Stopped(Position),
}

/// 目标端写入。
///
/// 每批在一个事务内提交，以主键 upsert / delete，重复应用同一批的结果不变；
/// 提交成功后把该批的终止位点写入 PositionTracker。超过 batch_size 的批次拆成多个事务，
/// 每个事务提交后位点前移到其最后一条记录。
pub struct Importer {
    task_id: TaskId,

    config: ImporterConfig,

    provider: Arc<DataSourceProvider>,

    tracker: Arc<PositionTracker>,

    progress: Arc<TaskProgress>,
}

impl Importer {
    pub fn new(task_id: TaskId, config: ImporterConfig, provider: Arc<DataSourceProvider>,
               tracker: Arc<PositionTracker>, progress: Arc<TaskProgress>) -> Self {
        Importer {
            task_id,
            config,
            provider,
            tracker,
            progress,
        }
    }

    /// 消费通道直到通道关闭或收到停止信号。停止信号在每批提交之后检查，不会截断批次
    pub async fn run(&self, channel: &mut Receiver<RecordBatch>, signal: &mut StopSignal) -> CResult<ImportOutcome> {
        info!("importer {} start, target {}.{}", self.task_id, self.config.data_source_name(), self.config.table());

        loop {
            let batch = tokio::select! {
                biased;
                _ = signal.stopped() => None,
                batch = channel.recv() => match batch {
                    Some(batch) => Some(batch),
                    None => return Ok(ImportOutcome::Drained(self.tracker.get(&self.task_id))),
                },
            };

            match batch {
                Some(batch) => self.apply(batch).await?,
                None => return Ok(ImportOutcome::Stopped(self.tracker.get(&self.task_id))),
            }

            if signal.is_stopped() {
                return Ok(ImportOutcome::Stopped(self.tracker.get(&self.task_id)));
            }
        }
    }

    /// 提交一批并推进位点
    pub async fn apply(&self, batch: RecordBatch) -> CResult<()> {
        for chunk in batch.records.chunks(*self.config.batch_size()) {
            self.write(chunk).await?;

            if let Some(last) = chunk.last() {
                self.tracker.set(&self.task_id, last.position.clone())?;
            }
            let (inventory, incremental): (Vec<&DataRecord>, Vec<&DataRecord>) =
                chunk.iter().partition(|r| !r.position.is_incremental());
            self.progress.add_inventory_imported(inventory.len() as u64);
            self.progress.add_incremental_events(incremental.len() as u64);
        }

        self.tracker.set(&self.task_id, batch.position.clone())?;
        debug!("importer {} committed {} records, position {}", self.task_id, batch.len(), batch.position);

        Ok(())
    }

    /// 在一个事务内写入，失败时回滚
    async fn write(&self, records: &[DataRecord]) -> CResult<()> {
        let mut conn = self.provider
            .get_connection(self.config.data_source())
            .await
            .map_err(ReError::into_target_write)?;
        conn.begin().await.map_err(ReError::into_target_write)?;

        let rs = match self.write_records(&mut conn, records).await {
            Ok(()) => conn.commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = rs {
            if conn.in_transaction() {
                if let Err(re) = conn.rollback().await {
                    warn!("importer {} rollback failed: {}", self.task_id, re);
                    conn.discard();
                }
            }
            return Err(e.into_target_write());
        }

        Ok(())
    }

    async fn write_records(&self, conn: &mut PooledConnection, records: &[DataRecord]) -> CResult<()> {
        let table = self.config.table();
        let primary_key = self.config.primary_key();
        for record in records {
            match (record.op, record.row.as_ref()) {
                (RecordOp::Insert | RecordOp::Update, Some(row)) => conn.upsert(table, primary_key, row).await?,
                (RecordOp::Insert | RecordOp::Update, None) => {
                    return Err(ReError::TargetWriteError(format!(
                        "record {} of task {} has no row image", record.key, self.task_id)));
                }
                (RecordOp::Delete, _) => conn.delete(table, &record.key).await?,
            }
        }

        Ok(())
    }
}
