pub mod config;
pub mod err;
pub mod log;
pub mod row;
pub mod server;
pub mod pretty_util;
pub mod time_util;
