//! 源端读取。
//!
//! 两种读取方式共用 [`Dumper`] 接口：全量按主键顺序分批扫描存量数据，增量按偏移量轮询变更日志。
//! 使用哪一种由任务的起始位点与 [`DumperConfig`] 的增量设置决定，见 [`select_dumper`]。

mod inventory;
mod incremental;

use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use common::err::CResult;
use connection::DataSourceProvider;

pub use incremental::IncrementalDumper;
pub use inventory::InventoryDumper;

use crate::config::sync_config::{DumperConfig, IncrementalMode};
use crate::position::{Checkpoint, Position};
use crate::record::RecordBatch;
use crate::task::progress::TaskProgress;
use crate::task::signal::StopSignal;

/// 一次读取的结束方式，携带最后一个被通道接收的位点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    /// 本阶段数据已读完
    Exhausted(Position),

    /// 收到停止信号
    Stopped(Position),

    /// 下游已关闭通道
    ChannelClosed(Position),
}

#[async_trait::async_trait]
pub trait Dumper: Send {

    /// 从 start 开始读取，批次推入 channel。通道满时挂起，直到有空位或收到停止信号
    async fn dump(&mut self, start: Position, channel: &Sender<RecordBatch>, signal: &mut StopSignal) -> CResult<DumpOutcome>;

}

/// Dumper 依赖的运行环境
#[derive(Clone)]
pub struct DumperContext {
    pub config: DumperConfig,

    pub provider: Arc<DataSourceProvider>,

    pub progress: Arc<TaskProgress>,
}

pub(crate) enum Push {
    Accepted,
    Stopped,
    Closed,
}

/// 推入一批，停止信号优先
pub(crate) async fn push(channel: &Sender<RecordBatch>, signal: &mut StopSignal, batch: RecordBatch) -> Push {
    tokio::select! {
        biased;
        _ = signal.stopped() => Push::Stopped,
        rs = channel.send(batch) => match rs {
            Ok(()) => Push::Accepted,
            Err(_) => Push::Closed,
        },
    }
}

/// 按位点选择读取方式。位点已完成时没有需要读取的数据
pub fn select_dumper(ctx: &DumperContext, position: &Position) -> Option<Box<dyn Dumper>> {
    match (position.checkpoint(), ctx.config.incremental()) {
        (Checkpoint::Init, _) | (Checkpoint::Inventory { .. }, _) => {
            Some(Box::new(InventoryDumper::new(ctx.clone())))
        }
        (Checkpoint::Incremental { .. }, IncrementalMode::ChangeLog { .. }) => {
            Some(Box::new(IncrementalDumper::new(ctx.clone())))
        }
        (Checkpoint::Incremental { .. }, IncrementalMode::Disabled) | (Checkpoint::Finished, _) => None,
    }
}

/// 依次执行全量、增量，直到数据读完、停止或通道关闭
pub async fn run_dumper(ctx: DumperContext, start: Position, channel: Sender<RecordBatch>,
                        mut signal: StopSignal) -> CResult<DumpOutcome> {
    let mut position = start;
    while let Some(mut dumper) = select_dumper(&ctx, &position) {
        match dumper.dump(position.clone(), &channel, &mut signal).await? {
            DumpOutcome::Exhausted(next) if next > position => position = next,
            DumpOutcome::Exhausted(next) => return Ok(DumpOutcome::Exhausted(next)),
            outcome => return Ok(outcome),
        }
    }

    Ok(DumpOutcome::Exhausted(position))
}
