use std::fmt;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use common::err::scaling_error::ReError;

/// Result returning Error
pub type WResult<T> = std::result::Result<T, WebError>;

/// 控制面自身的异常。作业引擎的异常会被转换为失败响应，不会走到这里；
/// 出现 WebError 意味着请求无法被正常应答，会话将被关闭。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WebError {
    /// 请求路径或参数无法解析
    Parse(String),
    /// 请求体反序列化失败
    Value(String),
    /// 响应序列化失败
    Serialization(String),
    /// 会话已关闭
    Closed,
    Engine(String),
}

impl std::error::Error for WebError {}

impl Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            WebError::Parse(s) | WebError::Value(s) => {
                write!(f, "{}", s)
            }
            WebError::Serialization(s) => write!(f, "Serialization failure: {}", s),
            WebError::Closed => write!(f, "Session closed"),
            WebError::Engine(s) => write!(f, "Engine failure: {}", s),
        }
    }
}

impl From<serde_json::error::Error> for WebError {
    fn from(err: serde_json::error::Error) -> Self {
        WebError::Value(err.to_string())
    }
}

impl serde::ser::Error for WebError {
    fn custom<T: Display>(msg: T) -> Self {
        WebError::Serialization(msg.to_string())
    }
}

impl From<ReError> for WebError {
    fn from(err: ReError) -> Self {
        WebError::Engine(err.to_string())
    }
}

impl From<std::num::ParseIntError> for WebError {
    fn from(err: std::num::ParseIntError) -> Self {
        WebError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for WebError {
    fn from(err: std::io::Error) -> Self {
        WebError::Value(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for WebError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        WebError::Value(err.to_string())
    }
}

impl From<WebError> for ReError {
    fn from(err: WebError) -> Self {
        ReError::String(err.to_string())
    }
}
