pub mod conn;
pub mod pool;
pub mod provider;
pub mod memory;
pub mod mysql;

pub use conn::connection::IConnection;
pub use conn::datasource_config::{DataSourceConfig, PoolOptions};
pub use pool::PooledConnection;
pub use provider::DataSourceProvider;

/// 连接串协议分隔符, 如 memory://ds_0、mysql://127.0.0.1:3306/ds_0
pub const SCHEME_SEPARATOR: &str = "://";
