use std::fmt;
use std::sync::Arc;

use common::err::scaling_error::ReError;
use common::err::CResult;
use common::row::{PrimaryKey, Row};

use crate::conn::connection::{ChangeSlice, IConnection, ScanQuery};
use crate::memory::database::{MemoryDatabase, WriteOp};

/// 内存数据库连接。事务内的写操作先缓存在连接上，commit 时原子应用
pub struct MemoryConnection {
    db: Arc<MemoryDatabase>,

    transaction: Option<Vec<WriteOp>>,
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("db", &self.db.name())
            .field("transaction", &self.transaction.as_ref().map(|t| t.len()))
            .finish()
    }
}

impl MemoryConnection {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        MemoryConnection {
            db,
            transaction: None,
        }
    }

    fn stage(&mut self, op: WriteOp) -> CResult<()> {
        match self.transaction.as_mut() {
            Some(ops) => {
                ops.push(op);
                Ok(())
            }
            // 自动提交
            None => self.db.apply(vec![op]),
        }
    }
}

#[async_trait::async_trait]
impl IConnection for MemoryConnection {
    async fn ping(&mut self) -> CResult<()> {
        self.db.check_online()
    }

    async fn count_rows(&mut self, table: &str) -> CResult<u64> {
        self.db.count(table)
    }

    async fn scan(&mut self, table: &str, query: &ScanQuery) -> CResult<Vec<Row>> {
        self.db.scan(table, query)
    }

    async fn log_head(&mut self) -> CResult<u64> {
        self.db.log_head()
    }

    async fn read_changes(&mut self, table: &str, from: u64, limit: usize) -> CResult<ChangeSlice> {
        self.db.read_changes(table, from, limit)
    }

    async fn begin(&mut self) -> CResult<()> {
        if self.transaction.is_some() {
            return Err(ReError::String("transaction already started".to_string()));
        }
        self.db.check_online()?;
        self.transaction = Some(Vec::new());
        Ok(())
    }

    async fn upsert(&mut self, table: &str, primary_key: &[String], row: &Row) -> CResult<()> {
        self.stage(WriteOp::Upsert {
            table: table.to_string(),
            primary_key: primary_key.to_vec(),
            row: row.clone(),
        })
    }

    async fn delete(&mut self, table: &str, key: &PrimaryKey) -> CResult<()> {
        self.stage(WriteOp::Delete {
            table: table.to_string(),
            key: key.clone(),
        })
    }

    async fn commit(&mut self) -> CResult<()> {
        match self.transaction.take() {
            Some(ops) => self.db.apply(ops),
            None => Err(ReError::String("no transaction to commit".to_string())),
        }
    }

    async fn rollback(&mut self) -> CResult<()> {
        self.transaction = None;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use common::row::{ColumnValue, PrimaryKey, Row};

    use crate::conn::connection::IConnection;
    use crate::memory::{MemoryConnection, MemoryDatabase};

    fn row(id: i64, user: &str) -> Row {
        let columns: Arc<[String]> = Arc::from(vec!["id".to_string(), "user_id".to_string()]);
        Row::new_row(vec![ColumnValue::Int(id), ColumnValue::from(user)], columns).unwrap()
    }

    #[tokio::test]
    async fn test_transaction() {
        MemoryDatabase::drop_database("mem_conn_tx");
        let db = MemoryDatabase::open("mem_conn_tx");
        db.create_table("t1", &["id", "user_id"], &["id"]).unwrap();

        let pk = vec!["id".to_string()];
        let mut conn = MemoryConnection::new(db.clone());
        conn.begin().await.unwrap();
        assert!(conn.in_transaction());
        conn.upsert("t1", &pk, &row(1, "a")).await.unwrap();
        conn.upsert("t1", &pk, &row(2, "b")).await.unwrap();
        assert_eq!(db.row_count("t1").unwrap(), 0);
        conn.commit().await.unwrap();
        assert!(!conn.in_transaction());
        assert_eq!(db.row_count("t1").unwrap(), 2);

        conn.begin().await.unwrap();
        conn.delete("t1", &PrimaryKey::from(ColumnValue::Int(1))).await.unwrap();
        conn.rollback().await.unwrap();
        assert_eq!(db.row_count("t1").unwrap(), 2);

        assert!(conn.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_unknown_column_fails() {
        MemoryDatabase::drop_database("mem_conn_cols");
        let db = MemoryDatabase::open("mem_conn_cols");
        db.create_table("t1", &["id"], &["id"]).unwrap();

        let mut conn = MemoryConnection::new(db.clone());
        let rs = conn.upsert("t1", &["id".to_string()], &row(1, "a")).await;
        assert!(rs.is_err());
        assert_eq!(db.row_count("t1").unwrap(), 0);
    }
}
