//! 配置管理
//!
//! TOML 配置文件 + `PREDICTION_` 前缀的环境变量覆盖，每个配置段都有 `validate()`。

pub mod models;


pub use models::*;
