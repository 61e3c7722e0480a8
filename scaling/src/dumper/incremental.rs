use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use common::err::scaling_error::ReError;
use common::err::CResult;
use connection::conn::connection::ChangeSlice;

use crate::config::sync_config::IncrementalMode;
use crate::dumper::{push, DumpOutcome, Dumper, DumperContext, Push};
use crate::position::{Checkpoint, Position};
use crate::record::{DataRecord, RecordBatch};
use crate::task::signal::StopSignal;

/// 增量读取：从位点中的偏移量开始轮询源端变更日志，直到收到停止信号。
///
/// 每批的终止位点为下一次读取的偏移量；没有新变更但偏移量前移时发出空批次。
pub struct IncrementalDumper {
    ctx: DumperContext,
}

impl IncrementalDumper {
    pub fn new(ctx: DumperContext) -> Self {
        IncrementalDumper {
            ctx,
        }
    }

    async fn read(&self, offset: u64) -> CResult<ChangeSlice> {
        let config = &self.ctx.config;
        let mut conn = self.ctx.provider.get_connection(config.data_source()).await?;
        conn.read_changes(config.table(), offset, *config.batch_size()).await
    }

    fn to_batch(&self, slice: ChangeSlice, position: &Position) -> CResult<RecordBatch> {
        let config = &self.ctx.config;
        let columns = config.scan_columns();

        let mut next = position.clone();
        let mut records = Vec::with_capacity(slice.changes.len());
        for change in slice.changes {
            next = next.advance(Checkpoint::Incremental { offset: change.offset + 1 });
            let row = match &change.row {
                Some(row) => Some(row.project(columns.as_deref())?),
                None => None,
            };
            records.push(DataRecord::change(change, row, next.clone()));
        }

        Ok(RecordBatch::new(records, next.advance(Checkpoint::Incremental { offset: slice.next_offset })))
    }
}

#[async_trait::async_trait]
impl Dumper for IncrementalDumper {
    async fn dump(&mut self, start: Position, channel: &Sender<RecordBatch>, signal: &mut StopSignal) -> CResult<DumpOutcome> {
        let config = &self.ctx.config;
        let progress = &self.ctx.progress;

        let poll_interval = match config.incremental() {
            IncrementalMode::ChangeLog { poll_interval } => *poll_interval,
            IncrementalMode::Disabled => return Ok(DumpOutcome::Exhausted(start)),
        };
        let mut offset = match start.checkpoint() {
            Checkpoint::Incremental { offset } => *offset,
            _ => return Ok(DumpOutcome::Exhausted(start)),
        };
        info!("incremental dump {}.{} from {}", config.data_source_name(), config.table(), start);

        let mut position = start;
        loop {
            if signal.is_stopped() {
                return Ok(DumpOutcome::Stopped(position));
            }

            let slice = self.read(offset).await.map_err(ReError::into_source_read)?;
            let next_offset = slice.next_offset.max(offset);
            let idle = slice.changes.is_empty();

            if !idle || next_offset > offset {
                let count = slice.changes.len();
                let batch = self.to_batch(slice, &position).map_err(ReError::into_source_read)?;
                let next = batch.position.clone();
                match push(channel, signal, batch).await {
                    Push::Accepted => {
                        debug!("incremental dump {} accepted {} events, position {}", config.table(), count, next);
                        progress.set_dumped_position(next.clone());
                        position = next;
                        offset = next_offset;
                    }
                    Push::Stopped => return Ok(DumpOutcome::Stopped(position)),
                    Push::Closed => return Ok(DumpOutcome::ChannelClosed(position)),
                }
            }

            if idle && !sleep_or_stop(signal, poll_interval).await {
                return Ok(DumpOutcome::Stopped(position));
            }
        }
    }
}

/// 等待下一次轮询。收到停止信号返回 false
async fn sleep_or_stop(signal: &mut StopSignal, interval: Duration) -> bool {
    tokio::select! {
        biased;
        _ = signal.stopped() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
