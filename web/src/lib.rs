//! 扩容作业的控制面：与传输无关的命令处理器，以及基于 actix-web 的 HTTP 入口。

pub mod api;
pub mod server;
pub mod web_error;
