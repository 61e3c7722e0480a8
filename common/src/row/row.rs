use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::err::scaling_error::ReError;
use crate::err::CResult;
use crate::row::column_value::ColumnValue;

/// 主键值，按主键列的声明顺序排列。按字典序比较，即为全量扫描的顺序。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(pub Vec<ColumnValue>);

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl From<ColumnValue> for PrimaryKey {
    fn from(v: ColumnValue) -> Self {
        PrimaryKey(vec![v])
    }
}

/// 一行数据。列名由同一次查询返回的所有行共享
#[derive(Clone, PartialEq)]
pub struct Row {
    values: Vec<ColumnValue>,

    columns: Arc<[String]>,
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Row");
        for (val, column) in self.values.iter().zip(self.columns.iter()) {
            debug.field(column.as_str(), val);
        }
        debug.finish()
    }
}

impl Row {
    /// Creates `Row` from values and columns.
    pub fn new_row(values: Vec<ColumnValue>, columns: Arc<[String]>) -> CResult<Self> {
        if values.len() != columns.len() {
            return Err(ReError::String(format!(
                "row has {} values but {} columns", values.len(), columns.len())));
        }

        Ok(Row { values, columns })
    }

    /// Returns length of a row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns_ref(&self) -> &[String] {
        &self.columns
    }

    pub fn columns(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    /// 按主键列提取主键
    pub fn key(&self, primary_key: &[String]) -> CResult<PrimaryKey> {
        let mut key = Vec::with_capacity(primary_key.len());
        for column in primary_key {
            match self.get(column) {
                Some(v) => key.push(v.clone()),
                None => {
                    return Err(ReError::String(format!("primary key column {} not found in row", column)));
                }
            }
        }

        Ok(PrimaryKey(key))
    }

    /// 列裁剪。未指定列时原样返回
    pub fn project(&self, columns: Option<&[String]>) -> CResult<Row> {
        let columns = match columns {
            None => return Ok(self.clone()),
            Some(c) => c,
        };

        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            match self.get(column) {
                Some(v) => values.push(v.clone()),
                None => {
                    return Err(ReError::String(format!("column {} not found in row", column)));
                }
            }
        }

        Row::new_row(values, Arc::from(columns.to_vec()))
    }
}
