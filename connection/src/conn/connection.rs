use std::fmt::Debug;

use common::err::CResult;
use common::row::{PrimaryKey, Row};

/// 按主键顺序分页扫描的查询条件
#[derive(Debug, Clone, Default)]
pub struct ScanQuery {
    /// 需要读取的列，为空时读取全部列
    pub columns: Option<Vec<String>>,

    /// 只返回主键严格大于 after 的行
    pub after: Option<PrimaryKey>,

    pub limit: usize,
}

/// 变更日志中的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// 变更日志中的一条记录
#[derive(Debug, Clone)]
pub struct RowChange {
    /// 在数据源变更日志中的偏移量
    pub offset: u64,

    pub table: String,

    pub op: ChangeOp,

    pub key: PrimaryKey,

    /// 变更后的行。Delete 时为空
    pub row: Option<Row>,
}

/// 一次变更日志读取的结果
#[derive(Debug, Clone, Default)]
pub struct ChangeSlice {
    pub changes: Vec<RowChange>,

    /// 下次读取的起始偏移量
    pub next_offset: u64,
}

/// 数据源连接。
///
/// Dumper 与 Importer 共用同一个接口：读取端使用 scan / read_changes，写入端使用 begin .. commit。
#[async_trait::async_trait]
pub trait IConnection: Send + Sync + Debug {

    async fn ping(&mut self) -> CResult<()>;

    /// 表的行数估计
    async fn count_rows(&mut self, table: &str) -> CResult<u64>;

    /// 按主键升序返回最多 limit 行
    async fn scan(&mut self, table: &str, query: &ScanQuery) -> CResult<Vec<Row>>;

    /// 当前变更日志的末尾偏移量，即下一条变更的偏移量
    async fn log_head(&mut self) -> CResult<u64>;

    /// 从 from 开始读取 table 上的变更，最多 limit 条
    async fn read_changes(&mut self, table: &str, from: u64, limit: usize) -> CResult<ChangeSlice>;

    async fn begin(&mut self) -> CResult<()>;

    /// insert-or-update，以 primary_key 为唯一键
    async fn upsert(&mut self, table: &str, primary_key: &[String], row: &Row) -> CResult<()>;

    async fn delete(&mut self, table: &str, key: &PrimaryKey) -> CResult<()>;

    async fn commit(&mut self) -> CResult<()>;

    async fn rollback(&mut self) -> CResult<()>;

    /// 是否有未结束的事务
    fn in_transaction(&self) -> bool;

}
