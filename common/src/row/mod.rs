pub mod column_value;
pub mod row;

pub use column_value::ColumnValue;
pub use row::{PrimaryKey, Row};
