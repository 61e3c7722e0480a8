use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;

/// 获取当前时间的毫秒数
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// 获取当前时间的格式化输出
pub fn now_str() -> String {
    let chrono_time = Local::now();

    chrono_time.format("%Y-%m-%d %H:%M:%S").to_string()
}
