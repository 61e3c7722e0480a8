use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use common::err::scaling_error::ReError;
use common::err::CResult;

use crate::position::Position;
use crate::task::task_id::TaskId;

/// 各任务已提交的位点，作业级所有。
///
/// 每个任务一个独立加锁的条目，不同任务之间的读写互不影响。
/// 位点单调不减：写入严格小于当前值的位点会被拒绝。
#[derive(Debug, Default)]
pub struct PositionTracker {
    entries: DashMap<TaskId, Arc<Mutex<Position>>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        PositionTracker {
            entries: DashMap::new(),
        }
    }

    /// 以给定初始位点创建 tracker，用于续传
    pub fn with_positions(positions: BTreeMap<TaskId, Position>) -> Self {
        let tracker = PositionTracker::new();
        for (task_id, position) in positions {
            tracker.entries.insert(task_id, Arc::new(Mutex::new(position)));
        }
        tracker
    }

    /// 任务当前位点，未记录时为初始位点
    pub fn get(&self, task_id: &TaskId) -> Position {
        match self.entry(task_id) {
            Some(entry) => entry.lock()
                .map(|p| p.clone())
                .unwrap_or_else(|e| e.into_inner().clone()),
            None => Position::init(),
        }
    }

    /// 写入位点。严格小于当前位点时返回 StalePositionError，当前位点不变
    pub fn set(&self, task_id: &TaskId, position: Position) -> CResult<()> {
        let entry = match self.entry(task_id) {
            Some(entry) => entry,
            None => Arc::clone(
                self.entries
                    .entry(task_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Position::init())))
                    .value(),
            ),
        };

        let mut current = entry.lock()?;
        if position < *current {
            return Err(ReError::StalePositionError {
                task_id: task_id.to_string(),
                current: current.to_string(),
                offered: position.to_string(),
            });
        }
        *current = position;

        Ok(())
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.contains_key(task_id)
    }

    /// 所有任务位点的快照
    pub fn snapshot(&self) -> BTreeMap<TaskId, Position> {
        let entries: Vec<(TaskId, Arc<Mutex<Position>>)> = self.entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        entries
            .into_iter()
            .map(|(id, entry)| {
                let position = entry.lock()
                    .map(|p| p.clone())
                    .unwrap_or_else(|e| e.into_inner().clone());
                (id, position)
            })
            .collect()
    }

    // 先复制出条目再加锁，避免持有分段锁等待任务锁
    fn entry(&self, task_id: &TaskId) -> Option<Arc<Mutex<Position>>> {
        self.entries.get(task_id).map(|e| Arc::clone(e.value()))
    }
}
