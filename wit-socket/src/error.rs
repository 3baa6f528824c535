//! wit-socket 错误类型定义
//!
//! 所有模块的错误类型统一在此定义，使用 thiserror 自动派生 Error trait

use thiserror::Error;

/// 统一错误类型
#[derive(Debug, Error)]
pub enum WitError {
    /// 帧编解码错误
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// 网络相关错误
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// 配置相关错误
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 错误代码（同时用作 StreamError 通知中的 code）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // 帧错误
    FrameTooShort,
    FrameTruncated,

    // 网络错误
    NetworkConnectFailed,
    NetworkNotAuthenticated,
    NetworkNotConnected,
    NetworkAlreadyConnected,
    NetworkLost,
    NetworkSendFailed,

    // 配置错误
    ConfigLoadFailed,
    ConfigSaveFailed,
    ConfigValidationFailed,

    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::FrameTooShort => write!(f, "FRAME_TOO_SHORT"),
            ErrorCode::FrameTruncated => write!(f, "FRAME_TRUNCATED"),
            ErrorCode::NetworkConnectFailed => write!(f, "NETWORK_CONNECT_FAILED"),
            ErrorCode::NetworkNotAuthenticated => write!(f, "NETWORK_NOT_AUTHENTICATED"),
            ErrorCode::NetworkNotConnected => write!(f, "NETWORK_NOT_CONNECTED"),
            ErrorCode::NetworkAlreadyConnected => write!(f, "NETWORK_ALREADY_CONNECTED"),
            ErrorCode::NetworkLost => write!(f, "NETWORK_LOST"),
            ErrorCode::NetworkSendFailed => write!(f, "NETWORK_SEND_FAILED"),
            ErrorCode::ConfigLoadFailed => write!(f, "CONFIG_LOAD_FAILED"),
            ErrorCode::ConfigSaveFailed => write!(f, "CONFIG_SAVE_FAILED"),
            ErrorCode::ConfigValidationFailed => write!(f, "CONFIG_VALIDATION_FAILED"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// 帧编解码错误
#[derive(Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes, header requires 17")]
    FrameTooShort { len: usize },

    #[error("Truncated payload: header declares {declared} bytes, buffer holds {available}")]
    TruncatedPayload { declared: u64, available: usize },

    #[error("Declared payload length overflows: json={json_length} binary={binary_length}")]
    LengthOverflow { json_length: u64, binary_length: u64 },
}

/// 网络相关错误
#[derive(Debug, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Socket already connected")]
    AlreadyConnected,

    #[error("Socket not connected")]
    NotConnected,

    #[error("Socket not authenticated")]
    NotAuthenticated,

    #[error("No data to send")]
    EmptyPayload,

    #[error("Connection lost - disconnected from server")]
    ConnectionLost,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        NetworkError::Json(e.to_string())
    }
}

/// 配置相关错误
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FrameError::FrameTooShort { .. } => ErrorCode::FrameTooShort,
            FrameError::TruncatedPayload { .. } | FrameError::LengthOverflow { .. } => {
                ErrorCode::FrameTruncated
            }
        }
    }
}

impl NetworkError {
    pub fn code(&self) -> ErrorCode {
        match self {
            NetworkError::ConnectionFailed(_) => ErrorCode::NetworkConnectFailed,
            NetworkError::AlreadyConnected => ErrorCode::NetworkAlreadyConnected,
            NetworkError::NotConnected => ErrorCode::NetworkNotConnected,
            NetworkError::NotAuthenticated => ErrorCode::NetworkNotAuthenticated,
            NetworkError::EmptyPayload => ErrorCode::NetworkSendFailed,
            NetworkError::ConnectionLost => ErrorCode::NetworkLost,
            NetworkError::SendFailed(_) => ErrorCode::NetworkSendFailed,
            NetworkError::Json(_) => ErrorCode::NetworkSendFailed,
        }
    }
}

impl WitError {
    /// 获取对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            WitError::Frame(e) => e.code(),
            WitError::Network(e) => e.code(),
            WitError::Config(e) => match e {
                ConfigError::LoadFailed(_) => ErrorCode::ConfigLoadFailed,
                ConfigError::SaveFailed(_) => ErrorCode::ConfigSaveFailed,
                ConfigError::ValidationFailed(_) => ErrorCode::ConfigValidationFailed,
            },
            WitError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// 检查是否为可恢复错误（重新连接即可恢复）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WitError::Network(NetworkError::ConnectionLost)
                | WitError::Network(NetworkError::ConnectionFailed(_))
                | WitError::Network(NetworkError::NotAuthenticated)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::FrameTooShort.to_string(), "FRAME_TOO_SHORT");
        assert_eq!(ErrorCode::NetworkConnectFailed.to_string(), "NETWORK_CONNECT_FAILED");
        assert_eq!(ErrorCode::NetworkLost.to_string(), "NETWORK_LOST");
        assert_eq!(ErrorCode::ConfigSaveFailed.to_string(), "CONFIG_SAVE_FAILED");
    }

    #[test]
    fn test_frame_error_display() {
        let error = FrameError::FrameTooShort { len: 3 };
        assert_eq!(error.to_string(), "Frame too short: 3 bytes, header requires 17");

        let error = FrameError::TruncatedPayload { declared: 40, available: 20 };
        assert!(error.to_string().contains("declares 40 bytes"));
    }

    #[test]
    fn test_network_error_display() {
        assert_eq!(NetworkError::NotAuthenticated.to_string(), "Socket not authenticated");
        assert_eq!(
            NetworkError::ConnectionLost.to_string(),
            "Connection lost - disconnected from server"
        );
    }

    #[test]
    fn test_wit_error_from_frame() {
        let error: WitError = FrameError::FrameTooShort { len: 0 }.into();
        assert_eq!(error.code(), ErrorCode::FrameTooShort);

        let error: WitError = FrameError::LengthOverflow {
            json_length: u64::MAX,
            binary_length: 1,
        }
        .into();
        assert_eq!(error.code(), ErrorCode::FrameTruncated);
    }

    #[test]
    fn test_wit_error_from_network() {
        let error: WitError = NetworkError::AlreadyConnected.into();
        assert_eq!(error.code(), ErrorCode::NetworkAlreadyConnected);
    }

    #[test]
    fn test_wit_error_from_config() {
        let error: WitError = ConfigError::ValidationFailed("empty url".to_string()).into();
        assert_eq!(error.code(), ErrorCode::ConfigValidationFailed);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: NetworkError = json_error.into();
        assert!(matches!(error, NetworkError::Json(_)));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(WitError::Network(NetworkError::ConnectionLost).is_recoverable());
        assert!(WitError::Network(NetworkError::ConnectionFailed("timeout".into())).is_recoverable());
        assert!(!WitError::Frame(FrameError::FrameTooShort { len: 1 }).is_recoverable());
        assert!(!WitError::Config(ConfigError::LoadFailed("io".into())).is_recoverable());
    }
}
