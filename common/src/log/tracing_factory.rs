use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "scaling.log";

/// TracingFactory 全局初始化结果。文件输出时持有 WorkerGuard，进程退出前不能被释放
static INIT: OnceCell<Option<WorkerGuard>> = OnceCell::new();

#[derive(Debug, Clone, Default)]
pub struct TracingFactoryOptions {
    debug: bool,

    /// EnvFilter 表达式
    level: Option<String>,

    /// 为空时输出到 stdout
    log_dir: Option<String>,
}

impl TracingFactoryOptions {
    pub fn new(debug: bool, level: Option<String>, log_dir: Option<String>) -> Self {
        TracingFactoryOptions {
            debug,
            level,
            log_dir,
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        TracingFactoryOptions::new(config.debug, config.level.clone(), config.get_log_dir())
    }

    fn filter(&self) -> EnvFilter {
        let default_level = if self.debug { "debug" } else { "info" };
        let directive = self.level.clone().unwrap_or_else(|| default_level.to_string());

        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    log_dir: Option<String>,
}

impl TracingFactory {
    pub fn init_log(debug: bool) -> TracingFactory {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new(debug, None, None))
    }

    /// 初始化全局 subscriber。重复调用只有第一次生效
    pub fn init_log_with_options(options: TracingFactoryOptions) -> TracingFactory {
        INIT.get_or_init(|| {
            let filter = options.filter();

            match options.log_dir.as_ref() {
                Some(dir) => {
                    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                    let (writer, guard) = tracing_appender::non_blocking(appender);

                    let rs = fmt()
                        .with_env_filter(filter)
                        .with_thread_ids(true)
                        .with_ansi(false)
                        .with_writer(writer)
                        .try_init();
                    if let Err(e) = rs {
                        eprintln!("Unable to set global default subscriber: {}", e);
                    }
                    Some(guard)
                }
                None => {
                    let rs = fmt()
                        .with_env_filter(filter)
                        .with_thread_ids(true)
                        .compact()
                        .try_init();
                    if let Err(e) = rs {
                        eprintln!("Unable to set global default subscriber: {}", e);
                    }
                    None
                }
            }
        });

        TracingFactory {
            log_dir: options.log_dir,
        }
    }

    pub fn get_log_dir(&self) -> Option<String> {
        self.log_dir.clone()
    }

    pub fn is_init() -> bool {
        INIT.get().is_some()
    }
}

#[cfg(test)]
mod test {
    use tracing::debug;

    use crate::log::tracing_factory::TracingFactory;

    #[test]
    fn test() {
        TracingFactory::init_log(true);
        assert!(TracingFactory::is_init());
        let f = TracingFactory::init_log(true);
        assert!(TracingFactory::is_init());
        assert_eq!(f.get_log_dir(), None);

        debug!("TracingFactory test: {:?}", "test");
    }
}
