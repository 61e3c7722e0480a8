use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Column, Connection, Executor, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use common::err::scaling_error::ReError;
use common::err::CResult;
use common::row::{ColumnValue, PrimaryKey, Row};

use crate::conn::connection::{ChangeSlice, IConnection, ScanQuery};
use crate::mysql::sql;

/// 单条 MySQL 连接。主键列按表缓存，事务由 START TRANSACTION / COMMIT 控制
pub struct MysqlConnection {
    conn: MySqlConnection,

    address: String,

    primary_keys: HashMap<String, Vec<String>>,

    in_transaction: bool,
}

impl fmt::Debug for MysqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConnection")
            .field("address", &self.address)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

pub(crate) fn sql_error(e: sqlx::Error) -> ReError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) | sqlx::Error::PoolTimedOut => {
            ReError::ConnectionError(e.to_string())
        }
        e => ReError::String(e.to_string()),
    }
}

fn bind_value<'q>(query: Query<'q, MySql, MySqlArguments>, value: &ColumnValue) -> Query<'q, MySql, MySqlArguments> {
    match value {
        ColumnValue::Null => query.bind(Option::<String>::None),
        ColumnValue::Bool(v) => query.bind(*v),
        ColumnValue::Int(v) => query.bind(*v),
        ColumnValue::Double(v) => query.bind(*v),
        ColumnValue::String(v) => query.bind(v.clone()),
    }
}

/// 按列类型解码。时间、定点数等没有对应 ColumnValue 的类型转为字符串
fn decode_column(row: &MySqlRow, index: usize) -> CResult<ColumnValue> {
    if row.try_get_raw(index).map_err(sql_error)?.is_null() {
        return Ok(ColumnValue::Null);
    }

    let type_name = row.column(index).type_info().name();
    let value = match type_name {
        "BOOLEAN" => ColumnValue::Bool(row.try_get::<bool, _>(index).map_err(sql_error)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            ColumnValue::Int(row.try_get::<i64, _>(index).map_err(sql_error)?)
        }
        "YEAR" => ColumnValue::Int(row.try_get_unchecked::<i64, _>(index).map_err(sql_error)?),
        t if t.ends_with("UNSIGNED") => {
            let v = row.try_get::<u64, _>(index).map_err(sql_error)?;
            match i64::try_from(v) {
                Ok(v) => ColumnValue::Int(v),
                Err(_) => ColumnValue::String(v.to_string()),
            }
        }
        "FLOAT" => ColumnValue::Double(row.try_get::<f32, _>(index).map_err(sql_error)? as f64),
        "DOUBLE" => ColumnValue::Double(row.try_get::<f64, _>(index).map_err(sql_error)?),
        "DATETIME" | "TIMESTAMP" => {
            ColumnValue::String(row.try_get::<NaiveDateTime, _>(index).map_err(sql_error)?.to_string())
        }
        "DATE" => ColumnValue::String(row.try_get::<NaiveDate, _>(index).map_err(sql_error)?.to_string()),
        "TIME" => ColumnValue::String(row.try_get::<NaiveTime, _>(index).map_err(sql_error)?.to_string()),
        // 二进制协议下以字符串传输
        "DECIMAL" | "JSON" | "ENUM" | "SET" => {
            ColumnValue::String(row.try_get_unchecked::<String, _>(index).map_err(sql_error)?)
        }
        _ => match row.try_get::<String, _>(index) {
            Ok(v) => ColumnValue::String(v),
            Err(_) => {
                let bytes = row.try_get::<Vec<u8>, _>(index).map_err(sql_error)?;
                ColumnValue::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };

    Ok(value)
}

fn decode_rows(rows: &[MySqlRow]) -> CResult<Vec<Row>> {
    let first = match rows.first() {
        Some(first) => first,
        None => return Ok(Vec::new()),
    };
    let columns: Arc<[String]> = first.columns().iter().map(|c| c.name().to_string()).collect();

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(decode_column(row, i)?);
        }
        result.push(Row::new_row(values, Arc::clone(&columns))?);
    }

    Ok(result)
}

impl MysqlConnection {
    pub fn new(conn: MySqlConnection, address: &str) -> Self {
        MysqlConnection {
            conn,
            address: address.to_string(),
            primary_keys: HashMap::new(),
            in_transaction: false,
        }
    }

    async fn primary_key(&mut self, table: &str) -> CResult<Vec<String>> {
        if let Some(pk) = self.primary_keys.get(table) {
            return Ok(pk.clone());
        }

        let (schema, name) = sql::split_table(table);
        let rows = sqlx::query(sql::PRIMARY_KEY_SQL)
            .bind(schema)
            .bind(name)
            .fetch_all(&mut self.conn)
            .await
            .map_err(sql_error)?;
        let mut pk = Vec::with_capacity(rows.len());
        for row in &rows {
            pk.push(row.try_get::<String, _>(0).map_err(sql_error)?);
        }
        if pk.is_empty() {
            return Err(ReError::NotFoundError(format!("primary key of table {} on {}", table, self.address)));
        }

        debug!("mysql {} table {} primary key {:?}", self.address, table, pk);
        self.primary_keys.insert(table.to_string(), pk.clone());
        Ok(pk)
    }

    async fn execute_raw(&mut self, statement: &str) -> CResult<()> {
        (&mut self.conn).execute(statement).await.map_err(sql_error)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl IConnection for MysqlConnection {
    async fn ping(&mut self) -> CResult<()> {
        Connection::ping(&mut self.conn).await.map_err(sql_error)
    }

    async fn count_rows(&mut self, table: &str) -> CResult<u64> {
        let row = sqlx::query(&sql::count_sql(table))
            .fetch_one(&mut self.conn)
            .await
            .map_err(sql_error)?;
        let count = row.try_get::<i64, _>(0).map_err(sql_error)?;

        Ok(count.max(0) as u64)
    }

    async fn scan(&mut self, table: &str, query: &ScanQuery) -> CResult<Vec<Row>> {
        let primary_key = self.primary_key(table).await?;
        let statement = sql::scan_sql(table, query.columns.as_deref(), &primary_key, query.after.is_some())?;

        let mut q = sqlx::query(&statement);
        if let Some(after) = query.after.as_ref() {
            if after.0.len() != primary_key.len() {
                return Err(ReError::String(format!(
                    "scan position {} does not match primary key {:?} of {}", after, primary_key, table)));
            }
            for value in &after.0 {
                q = bind_value(q, value);
            }
        }
        let rows = q.bind(query.limit as u64)
            .fetch_all(&mut self.conn)
            .await
            .map_err(sql_error)?;

        decode_rows(&rows)
    }

    /// 没有可读取的变更日志，起点固定为 0
    async fn log_head(&mut self) -> CResult<u64> {
        Ok(0)
    }

    async fn read_changes(&mut self, table: &str, _from: u64, _limit: usize) -> CResult<ChangeSlice> {
        Err(ReError::SourceReadError(format!(
            "mysql source {} has no change log for table {}, run the job with incremental disabled",
            self.address, table)))
    }

    async fn begin(&mut self) -> CResult<()> {
        if self.in_transaction {
            return Err(ReError::String("transaction already started".to_string()));
        }
        self.execute_raw("START TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn upsert(&mut self, table: &str, primary_key: &[String], row: &Row) -> CResult<()> {
        let statement = sql::upsert_sql(table, row.columns_ref(), primary_key)?;
        let mut q = sqlx::query(&statement);
        for value in row.values() {
            q = bind_value(q, value);
        }
        q.execute(&mut self.conn).await.map_err(sql_error)?;
        Ok(())
    }

    async fn delete(&mut self, table: &str, key: &PrimaryKey) -> CResult<()> {
        let primary_key = self.primary_key(table).await?;
        if key.0.len() != primary_key.len() {
            return Err(ReError::String(format!(
                "key {} does not match primary key {:?} of {}", key, primary_key, table)));
        }

        let statement = sql::delete_sql(table, &primary_key)?;
        let mut q = sqlx::query(&statement);
        for value in &key.0 {
            q = bind_value(q, value);
        }
        q.execute(&mut self.conn).await.map_err(sql_error)?;
        Ok(())
    }

    async fn commit(&mut self) -> CResult<()> {
        if !self.in_transaction {
            return Err(ReError::String("no transaction to commit".to_string()));
        }
        // 提交失败时保持事务状态，由调用方回滚或丢弃连接
        self.execute_raw("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> CResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.execute_raw("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}
