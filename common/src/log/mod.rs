pub mod tracing_factory;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// 测试用日志。可重复调用，只有第一次生效
pub fn init_test_log() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
