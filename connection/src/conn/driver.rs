use common::err::CResult;

use crate::conn::connection::IConnection;
use crate::conn::datasource_config::DataSourceConfig;

/// 按连接串协议创建连接
#[async_trait::async_trait]
pub trait Driver: Send + Sync {

    /// 支持的协议，如 "memory"
    fn scheme(&self) -> &'static str;

    async fn connect(&self, config: &DataSourceConfig) -> CResult<Box<dyn IConnection>>;

}
