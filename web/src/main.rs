use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, warn};

use common::config::load_style::Format;
use common::config::{read_config, ServerConfig};
use common::err::CResult;
use common::log::tracing_factory::{TracingFactory, TracingFactoryOptions};
use common::pretty_util::to_string_pretty;
use common::server::{Server, ShutdownHandle};
use scaling::JobManager;
use web::server::{EngineService, ScalingHttpServer};

#[derive(Parser, Serialize, Debug, Clone)]
#[command(name = "scaling-server")]
#[command(version = "0.0.2")]
#[command(about = "Sharded database online scaling server")]
#[command(long_about = None)]
pub(crate) struct CliArgs {
    /// 加载的配置文件路径，文件不存在时使用默认配置
    #[arg(short, long, help = "Path to loaded configuration file", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "enable debug mode", default_value_t = false)]
    pub debug: bool,

    #[arg(short, long, help = "output format: [yaml | json], default Yaml", default_value = "yaml")]
    pub format: String,

    #[arg(long = "host", help = "listen host", value_name = "host")]
    pub host: Option<String>,

    #[arg(long = "port", help = "listen port, [1-65535]", value_name = "port")]
    pub port: Option<u16>,
}

#[tokio::main]
async fn main() -> CResult<()> {
    let args = CliArgs::parse();
    let format = Format::format(&args.format);

    let config = load_config(&args);
    eprintln!("load config: \n{}", to_string_pretty(&format, &config));

    let log_factory = TracingFactory::init_log_with_options(TracingFactoryOptions::from_config(&config.log));
    eprintln!("log_dir: {:?}", log_factory.get_log_dir());

    // 任务运行在主 runtime 上，不占用 actix 的 worker
    let manager = Arc::new(JobManager::new(config.job.clone()).with_runtime(Handle::current()));

    let mut http = ScalingHttpServer::new(config.server.clone(), Arc::clone(&manager));
    http.start().await?;

    let mut shutdown = ShutdownHandle::create();
    shutdown.add_service(Box::new(http));
    shutdown.add_service(Box::new(EngineService::new(manager)));

    tokio::signal::ctrl_c().await?;
    info!("receive ctrl-c, shutting down");
    shutdown.shutdown_services(true).await
}

/// 读取配置文件，命令行参数覆盖文件中的值
fn load_config(args: &CliArgs) -> ServerConfig {
    let mut config = match &args.config {
        Some(path) => match read_config(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("read config {:?} failed, use default: {}", path, e);
                eprintln!("read config {:?} failed, use default: {}", path, e);
                ServerConfig::default()
            }
        },
        None => ServerConfig::default(),
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        config.log.debug = true;
    }

    config
}
