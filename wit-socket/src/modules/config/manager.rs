//! 配置管理器

use crate::error::ConfigError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 配置目录名
pub const APP_DIR: &str = "wit-socket";

/// 默认服务地址
pub const DEFAULT_SERVER_URL: &str = "wss://api.wit.ai/composer";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub wit_auth_token: Option<String>,
}

/// WebSocket 设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SocketSettings {
    pub server_url: String,
    /// Sec-WebSocket-Protocol，默认不发送
    pub protocol: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            protocol: None,
            connect_timeout_secs: 30,
        }
    }
}

/// 日志设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 用户配置
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    pub api: ApiConfig,
    pub socket: SocketSettings,
    pub logging: LoggingSettings,
}

impl UserConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.socket.server_url.trim();
        if !(url.starts_with("wss://") || url.starts_with("ws://")) {
            return Err(ConfigError::ValidationFailed(format!(
                "server_url must use ws:// or wss://, got '{}'",
                url
            )));
        }
        if self.socket.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: ArcSwap<UserConfig>,
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self::new(config_dir)
    }
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        let config = ArcSwap::new(Arc::new(UserConfig::default()));
        Self { config, config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 读取配置文件，不存在时使用默认值
    pub fn load(&self) -> Result<UserConfig, ConfigError> {
        if !self.config_path.exists() {
            tracing::debug!("No config at {}, using defaults", self.config_path.display());
            return Ok(UserConfig::default());
        }
        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        let config: UserConfig =
            toml::from_str(&content).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        self.config.store(Arc::new(config.clone()));
        Ok(config)
    }

    pub fn save(&self, config: &UserConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let content =
            toml::to_string(config).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }
        std::fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        self.config.store(Arc::new(config.clone()));
        tracing::info!("Saved config to {}", self.config_path.display());
        Ok(())
    }

    pub fn current(&self) -> Arc<UserConfig> {
        self.config.load_full()
    }

    pub fn update<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut UserConfig),
    {
        let mut config = (*self.current()).clone();
        f(&mut config);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_default() {
        let config = UserConfig::default();
        assert_eq!(config.socket.server_url, "wss://api.wit.ai/composer");
        assert_eq!(config.socket.connect_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.api.wit_auth_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load().unwrap(), UserConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("nested"));

        manager
            .update(|config| {
                config.api.wit_auth_token = Some("token-123".to_string());
                config.socket.connect_timeout_secs = 5;
            })
            .unwrap();
        assert_eq!(manager.current().socket.connect_timeout_secs, 5);

        let reloaded = ConfigManager::new(dir.path().join("nested")).load().unwrap();
        assert_eq!(reloaded.api.wit_auth_token.as_deref(), Some("token-123"));
        assert_eq!(reloaded.socket.connect_timeout_secs, 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[api]\nwit_auth_token = \"abc\"\n",
        )
        .unwrap();

        let config = ConfigManager::new(dir.path().to_path_buf()).load().unwrap();
        assert_eq!(config.api.wit_auth_token.as_deref(), Some("abc"));
        assert_eq!(config.socket, SocketSettings::default());
    }

    #[test]
    fn test_invalid_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "socket = 3").unwrap();
        let result = ConfigManager::new(dir.path().to_path_buf()).load();
        assert!(matches!(result, Err(ConfigError::LoadFailed(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = UserConfig::default();
        config.socket.server_url = "https://api.wit.ai".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));

        let mut config = UserConfig::default();
        config.socket.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = UserConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert!(manager.save(&config).is_err());
        assert!(!manager.config_path().exists());
    }
}
