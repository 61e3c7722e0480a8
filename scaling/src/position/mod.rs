pub mod tracker;

use std::fmt;

use serde::{Deserialize, Serialize};

use common::row::PrimaryKey;

pub use tracker::PositionTracker;

/// 任务在源端数据流中的断点。
///
/// 变体声明顺序即阶段顺序：`Init < Inventory < Incremental < Finished`。
/// 同一阶段内，全量阶段按已读取的最大主键比较，增量阶段按变更日志偏移量比较。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Checkpoint {
    /// 尚未读取任何数据
    Init,

    /// 全量阶段。log_start 为全量开始时变更日志的位置，全量结束后从此处开始增量
    Inventory {
        log_start: u64,
        last_key: Option<PrimaryKey>,
    },

    /// 增量阶段，offset 为下一条待读取的变更
    Incremental {
        offset: u64,
    },

    /// 仅全量的任务已完成
    Finished,
}

/// 断点 + 单调递增的序号。先比较断点，再比较序号
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    checkpoint: Checkpoint,

    seq: u64,
}

impl Default for Position {
    fn default() -> Self {
        Position::init()
    }
}

impl Position {
    pub fn init() -> Self {
        Position::new(Checkpoint::Init, 0)
    }

    pub fn new(checkpoint: Checkpoint, seq: u64) -> Self {
        Position {
            checkpoint,
            seq,
        }
    }

    /// 推进到新断点，序号加一
    pub fn advance(&self, checkpoint: Checkpoint) -> Position {
        Position::new(checkpoint, self.seq + 1)
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_init(&self) -> bool {
        matches!(self.checkpoint, Checkpoint::Init)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.checkpoint, Checkpoint::Finished)
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self.checkpoint, Checkpoint::Incremental { .. })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.checkpoint {
            Checkpoint::Init => write!(f, "init#{}", self.seq),
            Checkpoint::Inventory { log_start, last_key: Some(key) } => {
                write!(f, "inventory[{}]{}#{}", log_start, key, self.seq)
            }
            Checkpoint::Inventory { log_start, last_key: None } => {
                write!(f, "inventory[{}]()#{}", log_start, self.seq)
            }
            Checkpoint::Incremental { offset } => write!(f, "incremental@{}#{}", offset, self.seq),
            Checkpoint::Finished => write!(f, "finished#{}", self.seq),
        }
    }
}

#[cfg(test)]
mod test {
    use common::row::{ColumnValue, PrimaryKey};

    use crate::position::{Checkpoint, Position};

    fn inventory(key: i64) -> Checkpoint {
        Checkpoint::Inventory { log_start: 7, last_key: Some(PrimaryKey::from(ColumnValue::Int(key))) }
    }

    #[test]
    fn test_phase_order() {
        let init = Position::init();
        let inv = init.advance(Checkpoint::Inventory { log_start: 7, last_key: None });
        let inv1 = inv.advance(inventory(1));
        let inv2 = inv1.advance(inventory(2));
        let inc = inv2.advance(Checkpoint::Incremental { offset: 7 });
        let inc2 = inc.advance(Checkpoint::Incremental { offset: 9 });

        assert!(init < inv);
        assert!(inv < inv1);
        assert!(inv1 < inv2);
        assert!(inv2 < inc);
        assert!(inc < inc2);
        assert!(inc2 < Position::new(Checkpoint::Finished, 0));
        assert_eq!(inc2.seq(), 5);
    }

    #[test]
    fn test_same_checkpoint_orders_by_seq() {
        let a = Position::new(Checkpoint::Incremental { offset: 3 }, 1);
        let b = a.advance(Checkpoint::Incremental { offset: 3 });
        assert!(a < b);
    }

    #[test]
    fn test_serde() {
        let p = Position::new(inventory(5), 2);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"checkpoint":{"phase":"inventory","logStart":7,"lastKey":[5]},"seq":2}"#);
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert_eq!(p.to_string(), "inventory[7](5)#2");
    }
}
