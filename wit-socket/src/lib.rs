//! Wit Socket 核心库
//!
//! Wit.ai composer WebSocket 二进制分帧协议的客户端实现

pub mod error;
pub mod events;
pub mod modules;

use anyhow::{Context, Result};
use modules::config::{ConfigManager, LoggingSettings, UserConfig};
use modules::network::{SocketState, WebSocketConfig, WitSocketClient};
use std::time::Duration;

pub use error::{ConfigError, ErrorCode, FrameError, NetworkError, WitError};
pub use events::{EventObservers, SocketEvent};

/// 认证 token 环境变量
pub const AUTH_TOKEN_ENV: &str = "WIT_AUTH_TOKEN";

/// 初始化日志
pub fn init_tracing(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .with_context(|| format!("invalid log level '{}'", level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;
    Ok(())
}

/// 运行命令行：合成参数中的文本并输出流式进度
pub fn run() -> Result<()> {
    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("usage: wit-socket <text>");
    }

    let config_manager = ConfigManager::default();
    let loaded = config_manager.load();
    init_tracing(&log_level(&loaded))?;
    let config = loaded.inspect_err(|e| {
        tracing::error!(
            "Failed to load config from {}: {}",
            config_manager.config_path().display(),
            e
        )
    })?;
    tracing::debug!("Using config from {}", config_manager.config_path().display());

    let token = std::env::var(AUTH_TOKEN_ENV)
        .ok()
        .or_else(|| config.api.wit_auth_token.clone())
        .with_context(|| {
            format!(
                "no auth token, set {} or api.wit_auth_token in {}",
                AUTH_TOKEN_ENV,
                config_manager.config_path().display()
            )
        })?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(synthesize(WebSocketConfig::from(&config.socket), token, text))?;
    Ok(())
}

/// 日志级别：配置加载失败时使用默认级别，保证错误能被记录
fn log_level(loaded: &Result<UserConfig, ConfigError>) -> String {
    match loaded {
        Ok(config) => config.logging.level.clone(),
        Err(_) => LoggingSettings::default().level,
    }
}

/// 连接、认证并合成文本，返回收到的数据字节数
///
/// 流结束前连接断开时返回错误。
pub async fn synthesize(config: WebSocketConfig, token: String, text: String) -> Result<usize> {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let client = WitSocketClient::new(config)?;
    let mut events = client.subscribe();

    client.connect(token)?;
    client
        .wait_for_state(SocketState::Authenticated, timeout)
        .await?;

    let request_id = client.synthesize(serde_json::json!({ "q": text }))?;
    tracing::info!("Synthesize request {} sent", request_id);

    let mut total = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::StreamProgress { chunk, .. } => {
                total += chunk.len();
                tracing::info!("Received {} bytes ({} total)", chunk.len(), total);
            }
            SocketEvent::StreamComplete => {
                tracing::info!("Stream complete, {} bytes received", total);
                break;
            }
            SocketEvent::StreamError { code, message } => {
                client.close();
                anyhow::bail!("stream failed: {} {}", code, message);
            }
            SocketEvent::StateChanged {
                new_state: SocketState::Disconnected,
                ..
            } => {
                anyhow::bail!("connection closed before the stream completed");
            }
            SocketEvent::StateChanged { .. } => {}
        }
    }

    client.close();
    Ok(total)
}
