//! 传输层接口
//!
//! 会话只依赖此 trait，生产环境使用 [`WebSocketTransport`](super::websocket::WebSocketTransport)，
//! 测试中使用记录型实现。

use crate::error::NetworkError;

/// 传输层事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 握手完成
    Connected,
    /// 连接错误
    Error(String),
    /// 连接关闭
    Closed { code: u16, reason: String, clean: bool },
    /// 二进制消息
    BinaryMessage(Vec<u8>),
    /// 文本消息 (协议中不使用)
    TextMessage(String),
}

/// 传输层
///
/// 所有操作都不阻塞，结果通过 [`TransportEvent`] 异步送达。
pub trait Transport: Send + Sync {
    /// 发起连接
    fn connect(&self) -> Result<(), NetworkError>;

    /// 是否已连接
    fn is_connected(&self) -> bool;

    /// 发送数据
    fn send(&self, data: Vec<u8>, is_binary: bool) -> Result<(), NetworkError>;

    /// 关闭连接，可重复调用
    fn close(&self);
}
