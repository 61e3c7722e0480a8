use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::position::Position;
use crate::task::task_id::TaskId;

/// 任务运行状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// 已创建，未启动
    Pending,
    Running,
    /// 仅全量任务已完成
    Finished,
    Stopped,
    Failed(String),
}

impl TaskStatus {
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Stopped => "STOPPED",
            TaskStatus::Failed(_) => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Stopped | TaskStatus::Failed(_))
    }
}

/// 任务运行时进度，由 Dumper/Importer 更新，控制面只读快照
#[derive(Debug)]
pub struct TaskProgress {
    status: Mutex<TaskStatus>,

    /// 已被通道接收的位点
    dumped: Mutex<Position>,

    estimated_rows: AtomicU64,

    inventory_dumped: AtomicU64,

    inventory_imported: AtomicU64,

    incremental_events: AtomicU64,
}

/// 单个任务的进度快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressView {
    pub task_id: TaskId,

    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// 全量开始时源表的行数
    pub estimated_rows: u64,

    pub inventory_dumped: u64,

    pub inventory_imported: u64,

    pub incremental_events: u64,

    pub dumped_position: Position,

    /// 已提交到目标端的位点，续传由此开始
    pub committed_position: Position,

    /// 全量阶段完成百分比
    pub percent: u8,
}

impl Default for TaskProgress {
    fn default() -> Self {
        TaskProgress::new(Position::init())
    }
}

impl TaskProgress {
    pub fn new(start: Position) -> Self {
        TaskProgress {
            status: Mutex::new(TaskStatus::Pending),
            dumped: Mutex::new(start),
            estimated_rows: AtomicU64::new(0),
            inventory_dumped: AtomicU64::new(0),
            inventory_imported: AtomicU64::new(0),
            incremental_events: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status.lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn set_status(&self, status: TaskStatus) {
        match self.status.lock() {
            Ok(mut s) => *s = status,
            Err(e) => *e.into_inner() = status,
        }
    }

    pub fn dumped_position(&self) -> Position {
        self.dumped.lock()
            .map(|p| p.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn set_dumped_position(&self, position: Position) {
        match self.dumped.lock() {
            Ok(mut p) => *p = position,
            Err(e) => *e.into_inner() = position,
        }
    }

    pub fn set_estimated_rows(&self, rows: u64) {
        self.estimated_rows.store(rows, Ordering::Relaxed);
    }

    pub fn add_inventory_dumped(&self, n: u64) {
        self.inventory_dumped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_inventory_imported(&self, n: u64) {
        self.inventory_imported.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_incremental_events(&self, n: u64) {
        self.incremental_events.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inventory_imported(&self) -> u64 {
        self.inventory_imported.load(Ordering::Relaxed)
    }

    pub fn incremental_events(&self) -> u64 {
        self.incremental_events.load(Ordering::Relaxed)
    }

    pub fn view(&self, task_id: &TaskId, committed: Position) -> TaskProgressView {
        let status = self.status();
        let estimated_rows = self.estimated_rows.load(Ordering::Relaxed);
        let inventory_imported = self.inventory_imported();

        let percent = if committed.is_incremental() || committed.is_finished() {
            100
        } else if estimated_rows == 0 {
            0
        } else {
            (inventory_imported.saturating_mul(100) / estimated_rows).min(99) as u8
        };

        TaskProgressView {
            task_id: task_id.clone(),
            status: status.name().to_string(),
            reason: match status {
                TaskStatus::Failed(reason) => Some(reason),
                _ => None,
            },
            estimated_rows,
            inventory_dumped: self.inventory_dumped.load(Ordering::Relaxed),
            inventory_imported,
            incremental_events: self.incremental_events(),
            dumped_position: self.dumped_position(),
            committed_position: committed,
            percent,
        }
    }
}
