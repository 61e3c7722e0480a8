use std::fmt::Debug;

use serde::Serialize;

use crate::config::load_style::Format;

pub fn to_string_pretty<T: Sized + Serialize + Debug>(f: &Format, val: &T) -> String {
    match f {
        Format::Json => {
            serde_json::to_string_pretty(val)
                .unwrap_or_else(|e| format!("to_string_pretty Json error: {}, {:?}", e, val))
        },
        Format::Yaml => {
            serde_yaml::to_string(val)
                .unwrap_or_else(|e| format!("to_string_pretty Yaml error: {}, {:?}", e, val))
        },
        Format::None => {
            format!("{:?}", val)
        }
    }
}
