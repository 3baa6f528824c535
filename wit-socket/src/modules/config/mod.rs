//! 配置模块

pub mod manager;

pub use manager::{ApiConfig, ConfigManager, LoggingSettings, SocketSettings, UserConfig};
