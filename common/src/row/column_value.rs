use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// 列值。
///
/// 作为主键的组成部分时需要全序比较：不同类型之间按 `Null < Bool < 数值 < String` 排序，
/// 整数与浮点数之间按数值比较。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl ColumnValue {
    fn rank(&self) -> u8 {
        match self {
            ColumnValue::Null => 0,
            ColumnValue::Bool(_) => 1,
            ColumnValue::Int(_) | ColumnValue::Double(_) => 2,
            ColumnValue::String(_) => 3,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl Ord for ColumnValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ColumnValue::Null, ColumnValue::Null) => Ordering::Equal,
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a.cmp(b),
            (ColumnValue::Int(a), ColumnValue::Int(b)) => a.cmp(b),
            (ColumnValue::Double(a), ColumnValue::Double(b)) => cmp_double(*a, *b),
            (ColumnValue::Int(a), ColumnValue::Double(b)) => cmp_int_double(*a, *b),
            (ColumnValue::Double(a), ColumnValue::Int(b)) => cmp_int_double(*b, *a).reverse(),
            (ColumnValue::String(a), ColumnValue::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// 数值序，0.0 与 -0.0 相等；NaN 按 total_cmp 排在两端
fn cmp_double(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// 整数与浮点数精确比较，不经过 `as f64` 截断
fn cmp_int_double(i: i64, d: f64) -> Ordering {
    // 2^63
    const BOUND: f64 = 9_223_372_036_854_775_808.0;

    if d.is_nan() {
        return if d.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if d >= BOUND {
        return Ordering::Less;
    }
    if d < -BOUND {
        return Ordering::Greater;
    }

    let t = d.trunc();
    match i.cmp(&(t as i64)) {
        Ordering::Equal => t.partial_cmp(&d).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl PartialOrd for ColumnValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ColumnValue {}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // 与 Eq 保持一致：Int(2) == Double(2.0)
        match self {
            ColumnValue::Null => 0u8.hash(state),
            ColumnValue::Bool(v) => v.hash(state),
            ColumnValue::Int(v) => (*v as f64).to_bits().hash(state),
            ColumnValue::Double(v) if *v == 0.0 => 0f64.to_bits().hash(state),
            ColumnValue::Double(v) => v.to_bits().hash(state),
            ColumnValue::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "NULL"),
            ColumnValue::Bool(v) => write!(f, "{}", v),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::String(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Int(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        ColumnValue::Int(v as i64)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Double(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Bool(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}
