use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lazy_static::lazy_static;

use common::err::scaling_error::ReError;
use common::err::CResult;
use common::row::{ColumnValue, PrimaryKey, Row};

use crate::conn::connection::{ChangeOp, ChangeSlice, RowChange, ScanQuery};

lazy_static! {
    /// 进程内所有内存数据库
    static ref DATABASES: DashMap<String, Arc<MemoryDatabase>> = DashMap::new();
}

/// 注入的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 读取该表失败
    Read,
    /// 写入该表失败
    Write,
}

#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,

    state: Mutex<DatabaseState>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    tables: HashMap<String, MemoryTable>,

    /// 变更日志，偏移量即下标
    changelog: Vec<RowChange>,

    faults: HashMap<String, Fault>,

    offline: bool,
}

#[derive(Debug)]
struct MemoryTable {
    columns: Arc<[String]>,

    primary_key: Vec<String>,

    rows: BTreeMap<PrimaryKey, Vec<ColumnValue>>,
}

/// 提交前校验完成的写操作
pub(crate) enum WriteOp {
    Upsert {
        table: String,
        primary_key: Vec<String>,
        row: Row,
    },
    Delete {
        table: String,
        key: PrimaryKey,
    },
}

enum Checked {
    Upsert { table: String, key: PrimaryKey, values: Vec<ColumnValue> },
    Delete { table: String, key: PrimaryKey },
}

impl MemoryTable {
    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }

    fn key_of(&self, values: &[ColumnValue]) -> CResult<PrimaryKey> {
        let mut key = Vec::with_capacity(self.primary_key.len());
        for column in &self.primary_key {
            let idx = self.column_index(column)
                .ok_or_else(|| ReError::String(format!("primary key column {} not defined", column)))?;
            key.push(values[idx].clone());
        }

        Ok(PrimaryKey(key))
    }

    fn to_row(&self, values: &[ColumnValue]) -> CResult<Row> {
        Row::new_row(values.to_vec(), self.columns.clone())
    }

    /// 按列名将 row 对齐到表结构，缺失的列填 NULL
    fn align(&self, row: &Row) -> CResult<Vec<ColumnValue>> {
        let mut values = vec![ColumnValue::Null; self.columns.len()];
        for (column, value) in row.columns_ref().iter().zip(row.values()) {
            let idx = self.column_index(column)
                .ok_or_else(|| ReError::TargetWriteError(format!("unknown column {}", column)))?;
            values[idx] = value.clone();
        }

        Ok(values)
    }
}

impl MemoryDatabase {
    /// 打开数据库，不存在时创建
    pub fn open(name: &str) -> Arc<MemoryDatabase> {
        DATABASES
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase {
                name: name.to_string(),
                state: Mutex::new(DatabaseState::default()),
            }))
            .clone()
    }

    /// 删除数据库。已打开的连接仍持有旧实例
    pub fn drop_database(name: &str) {
        DATABASES.remove(name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 建表。同名表已存在时覆盖
    pub fn create_table(&self, table: &str, columns: &[&str], primary_key: &[&str]) -> CResult<()> {
        for pk in primary_key {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(pk)) {
                return Err(ReError::String(format!("primary key column {} not in columns", pk)));
            }
        }

        let mut state = self.state.lock()?;
        state.tables.insert(table.to_string(), MemoryTable {
            columns: Arc::from(columns.iter().map(|c| c.to_string()).collect::<Vec<_>>()),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            rows: BTreeMap::new(),
        });

        Ok(())
    }

    /// 业务写入：插入一行并记录变更日志。主键冲突时报错
    pub fn insert(&self, table: &str, values: Vec<ColumnValue>) -> CResult<()> {
        self.write_row(table, values, ChangeOp::Insert)
    }

    /// 业务写入：更新一行。行不存在时报错
    pub fn update(&self, table: &str, values: Vec<ColumnValue>) -> CResult<()> {
        self.write_row(table, values, ChangeOp::Update)
    }

    /// 业务写入：删除一行。行不存在时报错
    pub fn delete(&self, table: &str, key: PrimaryKey) -> CResult<()> {
        let mut state = self.state.lock()?;
        let t = state.tables.get_mut(table)
            .ok_or_else(|| ReError::String(format!("table {} not exists", table)))?;
        if t.rows.remove(&key).is_none() {
            return Err(ReError::String(format!("row {} not exists in {}", key, table)));
        }
        state.append_change(table, ChangeOp::Delete, key, None);

        Ok(())
    }

    fn write_row(&self, table: &str, values: Vec<ColumnValue>, op: ChangeOp) -> CResult<()> {
        let mut state = self.state.lock()?;
        let t = state.tables.get_mut(table)
            .ok_or_else(|| ReError::String(format!("table {} not exists", table)))?;
        if values.len() != t.columns.len() {
            return Err(ReError::String(format!("table {} has {} columns", table, t.columns.len())));
        }

        let key = t.key_of(&values)?;
        let exists = t.rows.contains_key(&key);
        match op {
            ChangeOp::Insert if exists => {
                return Err(ReError::String(format!("duplicate key {} in {}", key, table)));
            }
            ChangeOp::Update if !exists => {
                return Err(ReError::String(format!("row {} not exists in {}", key, table)));
            }
            _ => {}
        }

        let row = t.to_row(&values)?;
        t.rows.insert(key.clone(), values);
        state.append_change(table, op, key, Some(row));

        Ok(())
    }

    /// 表中全部行，按主键排序
    pub fn rows(&self, table: &str) -> CResult<Vec<Row>> {
        let state = self.state.lock()?;
        let t = state.table(table)?;
        t.rows.values().map(|v| t.to_row(v)).collect()
    }

    pub fn row_count(&self, table: &str) -> CResult<usize> {
        let state = self.state.lock()?;
        Ok(state.table(table)?.rows.len())
    }

    pub fn inject_fault(&self, table: &str, fault: Fault) -> CResult<()> {
        self.state.lock()?.faults.insert(table.to_string(), fault);
        Ok(())
    }

    pub fn clear_fault(&self, table: &str) -> CResult<()> {
        self.state.lock()?.faults.remove(table);
        Ok(())
    }

    /// 模拟连接断开
    pub fn set_offline(&self, offline: bool) -> CResult<()> {
        self.state.lock()?.offline = offline;
        Ok(())
    }

    pub(crate) fn check_online(&self) -> CResult<()> {
        if self.state.lock()?.offline {
            return Err(ReError::ConnectionError(format!("memory database {} is offline", self.name)));
        }
        Ok(())
    }

    pub(crate) fn count(&self, table: &str) -> CResult<u64> {
        let state = self.state.lock()?;
        state.check_read(&self.name, table)?;
        Ok(state.table(table)?.rows.len() as u64)
    }

    pub(crate) fn scan(&self, table: &str, query: &ScanQuery) -> CResult<Vec<Row>> {
        let state = self.state.lock()?;
        state.check_read(&self.name, table)?;
        let t = state.table(table)?;

        let lower = match query.after.as_ref() {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };

        let mut rows = Vec::new();
        for (_, values) in t.rows.range((lower, Bound::Unbounded)).take(query.limit) {
            let row = t.to_row(values)?;
            rows.push(row.project(query.columns.as_deref())?);
        }

        Ok(rows)
    }

    pub(crate) fn log_head(&self) -> CResult<u64> {
        let state = self.state.lock()?;
        if state.offline {
            return Err(ReError::ConnectionError(format!("memory database {} is offline", self.name)));
        }
        Ok(state.changelog.len() as u64)
    }

    pub(crate) fn read_changes(&self, table: &str, from: u64, limit: usize) -> CResult<ChangeSlice> {
        let state = self.state.lock()?;
        state.check_read(&self.name, table)?;
        state.table(table)?;

        let head = state.changelog.len() as u64;
        let mut changes = Vec::new();
        let mut next_offset = head.max(from);
        for change in state.changelog.iter().skip(from as usize) {
            if changes.len() >= limit {
                next_offset = change.offset;
                break;
            }
            if change.table == table {
                changes.push(change.clone());
            }
        }

        Ok(ChangeSlice { changes, next_offset })
    }

    /// 原子地应用一批写操作：全部校验通过后才修改数据
    pub(crate) fn apply(&self, ops: Vec<WriteOp>) -> CResult<()> {
        let mut state = self.state.lock()?;
        if state.offline {
            return Err(ReError::ConnectionError(format!("memory database {} is offline", self.name)));
        }

        let mut checked = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                WriteOp::Upsert { table, primary_key, row } => {
                    state.check_write(&table)?;
                    let t = state.table(&table).map_err(ReError::into_target_write)?;
                    let same_key = primary_key.len() == t.primary_key.len()
                        && primary_key.iter().zip(t.primary_key.iter()).all(|(a, b)| a.eq_ignore_ascii_case(b));
                    if !same_key {
                        return Err(ReError::TargetWriteError(format!(
                            "primary key {:?} does not match {:?} of table {}", primary_key, t.primary_key, table)));
                    }
                    let values = t.align(&row)?;
                    let key = t.key_of(&values).map_err(ReError::into_target_write)?;
                    if key.0.iter().any(|v| v.is_null()) {
                        return Err(ReError::TargetWriteError(format!("null primary key for table {}", table)));
                    }
                    checked.push(Checked::Upsert { table, key, values });
                }
                WriteOp::Delete { table, key } => {
                    state.check_write(&table)?;
                    state.table(&table).map_err(ReError::into_target_write)?;
                    checked.push(Checked::Delete { table, key });
                }
            }
        }

        for c in checked {
            match c {
                Checked::Upsert { table, key, values } => {
                    let row = match state.tables.get_mut(&table) {
                        Some(t) => {
                            let op = if t.rows.contains_key(&key) { ChangeOp::Update } else { ChangeOp::Insert };
                            let row = t.to_row(&values)?;
                            t.rows.insert(key.clone(), values);
                            (op, row)
                        }
                        None => continue,
                    };
                    state.append_change(&table, row.0, key, Some(row.1));
                }
                Checked::Delete { table, key } => {
                    let removed = state.tables.get_mut(&table)
                        .map(|t| t.rows.remove(&key).is_some())
                        .unwrap_or(false);
                    if removed {
                        state.append_change(&table, ChangeOp::Delete, key, None);
                    }
                }
            }
        }

        Ok(())
    }
}

impl DatabaseState {
    fn table(&self, table: &str) -> CResult<&MemoryTable> {
        self.tables
            .get(table)
            .ok_or_else(|| ReError::SourceReadError(format!("table {} not exists", table)))
    }

    fn check_read(&self, db: &str, table: &str) -> CResult<()> {
        if self.offline {
            return Err(ReError::ConnectionError(format!("memory database {} is offline", db)));
        }
        if self.faults.get(table) == Some(&Fault::Read) {
            return Err(ReError::SourceReadError(format!("injected read fault on {}.{}", db, table)));
        }
        Ok(())
    }

    fn check_write(&self, table: &str) -> CResult<()> {
        if self.faults.get(table) == Some(&Fault::Write) {
            return Err(ReError::TargetWriteError(format!("injected write fault on {}", table)));
        }
        Ok(())
    }

    fn append_change(&mut self, table: &str, op: ChangeOp, key: PrimaryKey, row: Option<Row>) {
        let offset = self.changelog.len() as u64;
        self.changelog.push(RowChange {
            offset,
            table: table.to_string(),
            op,
            key,
            row,
        });
    }
}
