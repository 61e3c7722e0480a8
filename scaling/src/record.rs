use common::row::{PrimaryKey, Row};

use connection::conn::connection::{ChangeOp, RowChange};

use crate::position::Position;

/// 目标端需要执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOp {
    Insert,
    Update,
    Delete,
}

/// 通道中传递的一条记录
#[derive(Debug, Clone)]
pub struct DataRecord {
    pub op: RecordOp,

    pub key: PrimaryKey,

    /// Delete 时为空
    pub row: Option<Row>,

    /// 提交此记录后任务可以续传的位点
    pub position: Position,
}

/// Dumper 一次推入通道的一批记录。
///
/// position 为该批的终止位点，Importer 提交整批后写入 PositionTracker。
/// 空批次只用于传递阶段切换（全量 -> 增量 / 完成）。
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub records: Vec<DataRecord>,

    pub position: Position,
}

impl RecordBatch {
    pub fn new(records: Vec<DataRecord>, position: Position) -> Self {
        RecordBatch {
            records,
            position,
        }
    }

    /// 只携带位点的空批次
    pub fn marker(position: Position) -> Self {
        RecordBatch::new(vec![], position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<ChangeOp> for RecordOp {
    fn from(op: ChangeOp) -> Self {
        match op {
            ChangeOp::Insert => RecordOp::Insert,
            ChangeOp::Update => RecordOp::Update,
            ChangeOp::Delete => RecordOp::Delete,
        }
    }
}

impl DataRecord {
    /// 全量阶段读取的一行
    pub fn inventory(key: PrimaryKey, row: Row, position: Position) -> Self {
        DataRecord {
            op: RecordOp::Insert,
            key,
            row: Some(row),
            position,
        }
    }

    /// 增量阶段的一条变更
    pub fn change(change: RowChange, row: Option<Row>, position: Position) -> Self {
        DataRecord {
            op: RecordOp::from(change.op),
            key: change.key,
            row,
            position,
        }
    }
}
