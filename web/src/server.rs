use std::sync::Arc;

use actix_web::dev::ServerHandle;
use actix_web::http::header::ContentType;
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use tracing::{error, info};

use common::config::HttpConfig;
use common::err::scaling_error::ReError;
use common::server::Server;
use scaling::JobManager;

use crate::api::handler::{CommandRequest, HttpServerHandler, Session};
use crate::api::result::R;
use crate::web_error::{WResult, WebError};

/// 一次 HTTP 请求对应的会话。 actix 的响应只能在 handler 返回时给出，所以先缓存已序列化的响应体
#[derive(Debug, Default)]
struct ActixSession {
    body: Option<String>,

    closed: bool,
}

#[async_trait]
impl Session for ActixSession {
    async fn write_and_flush(&mut self, response: R) -> WResult<()> {
        if self.closed {
            return Err(WebError::Closed);
        }
        self.body = Some(serde_json::to_string(&response)?);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
        self.body = None;
    }
}

impl ActixSession {
    fn into_response(self) -> HttpResponse {
        match self.body {
            Some(body) if !self.closed => HttpResponse::Ok().content_type(ContentType::json()).body(body),
            // 会话已关闭，断开连接而不返回残缺的响应体
            _ => HttpResponse::InternalServerError().force_close().finish(),
        }
    }
}

/// 所有请求都交给 HttpServerHandler 路由
async fn dispatch(handler: web::Data<HttpServerHandler>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let request = CommandRequest::new(req.method().as_str(), &req.uri().to_string(), body.to_vec());
    let mut session = ActixSession::default();
    handler.channel_read(&mut session, request).await;

    session.into_response()
}

/// 按 `[server]` 配置启动的 HTTP 控制面
pub struct ScalingHttpServer {
    config: HttpConfig,

    handler: web::Data<HttpServerHandler>,

    handle: Option<ServerHandle>,
}

impl ScalingHttpServer {
    pub fn new(config: HttpConfig, manager: Arc<JobManager>) -> Self {
        ScalingHttpServer {
            config,
            handler: web::Data::new(HttpServerHandler::new(manager)),
            handle: None,
        }
    }

    fn build(&self) -> Result<actix_web::dev::Server, ReError> {
        let handler = self.handler.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(handler.clone())
                .wrap(middleware::Logger::default())
                .default_service(web::to(dispatch))
        })
            .workers(self.config.workers.max(1))
            .disable_signals()
            .bind((self.config.host.as_str(), self.config.port))?
            .run();

        Ok(server)
    }
}

#[async_trait]
impl Server for ScalingHttpServer {
    async fn start(&mut self) -> Result<(), ReError> {
        let server = self.build()?;
        self.handle = Some(server.handle());

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("starting HTTP server at http://{}", addr);
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("HTTP server at {} exit: {}", addr, e);
            }
        });

        Ok(())
    }

    async fn shutdown(&mut self, graceful: bool) -> Result<(), ReError> {
        if let Some(handle) = self.handle.take() {
            handle.stop(graceful).await;
            info!("HTTP server stopped");
        }
        Ok(())
    }
}

/// 作业引擎。 关闭时停止所有作业并释放连接池
pub struct EngineService {
    manager: Arc<JobManager>,
}

impl EngineService {
    pub fn new(manager: Arc<JobManager>) -> Self {
        EngineService {
            manager,
        }
    }
}

#[async_trait]
impl Server for EngineService {
    async fn start(&mut self) -> Result<(), ReError> {
        Ok(())
    }

    async fn shutdown(&mut self, _graceful: bool) -> Result<(), ReError> {
        self.manager.stop_all().await;
        info!("scaling engine stopped");
        Ok(())
    }
}
