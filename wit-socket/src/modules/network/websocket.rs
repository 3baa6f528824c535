//! WebSocket 传输层
//!
//! 使用 tokio-tungstenite 实现 [`Transport`]。每次连接在运行时中启动一个任务，
//! 负责握手、读取消息和写出发送队列，结果以 [`TransportEvent`] 形式送出。

use crate::error::NetworkError;
use crate::modules::config::SocketSettings;
use crate::modules::config::manager::DEFAULT_SERVER_URL;
use crate::modules::network::transport::{Transport, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// 异常关闭代码
const ABNORMAL_CLOSE: u16 = 1006;
/// 正常关闭代码
const NORMAL_CLOSE: u16 = 1000;

/// WebSocket 配置
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// 服务器 URL
    pub url: String,
    /// Sec-WebSocket-Protocol
    pub protocol: Option<String>,
    /// 连接超时 (秒)
    pub connect_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            protocol: None,
            connect_timeout_secs: 30,
        }
    }
}

impl From<&SocketSettings> for WebSocketConfig {
    fn from(settings: &SocketSettings) -> Self {
        Self {
            url: settings.server_url.clone(),
            protocol: settings.protocol.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }
}

impl WebSocketConfig {
    /// 构建握手请求
    pub fn client_request(&self) -> Result<Request, NetworkError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        if let Some(protocol) = &self.protocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }
        Ok(request)
    }
}

/// 发送队列命令
#[derive(Debug)]
enum Outgoing {
    Frame { data: Vec<u8>, is_binary: bool },
    Close,
}

/// 单次连接的事件出口
///
/// 重新连接后，旧连接的事件和连接状态更新都会被丢弃。
#[derive(Debug, Clone)]
struct EventSink {
    id: u64,
    generation: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }

    fn send(&self, event: TransportEvent) {
        if self.is_current() {
            let _ = self.tx.send(event);
        } else {
            tracing::trace!("Dropping event from stale connection {}: {:?}", self.id, event);
        }
    }

    fn set_connected(&self, connected: bool) {
        if self.is_current() {
            self.connected.store(connected, Ordering::SeqCst);
        }
    }
}

/// WebSocket 传输层
#[derive(Debug)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
    runtime: Handle,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl WebSocketTransport {
    /// 在当前 tokio 运行时上创建传输层，返回事件接收端
    pub fn new(
        config: WebSocketConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), NetworkError> {
        let runtime = Handle::try_current()
            .map_err(|e| NetworkError::ConnectionFailed(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// 使用指定运行时创建传输层
    pub fn with_runtime(
        config: WebSocketConfig,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Self {
            config,
            runtime,
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            outgoing: Mutex::new(None),
            event_tx,
        };
        (transport, event_rx)
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> Result<(), NetworkError> {
        let request = self.config.client_request()?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(previous) = self.outgoing.lock().replace(tx) {
            let _ = previous.send(Outgoing::Close);
        }

        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.connected.store(false, Ordering::SeqCst);
        let sink = EventSink {
            id,
            generation: self.generation.clone(),
            connected: self.connected.clone(),
            tx: self.event_tx.clone(),
        };

        tracing::info!("Connecting to {}", self.config.url);
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        self.runtime.spawn(run_connection(request, timeout, rx, sink));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, data: Vec<u8>, is_binary: bool) -> Result<(), NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }
        let outgoing = self.outgoing.lock();
        let Some(tx) = outgoing.as_ref() else {
            return Err(NetworkError::NotConnected);
        };
        tx.send(Outgoing::Frame { data, is_binary })
            .map_err(|_| NetworkError::ConnectionLost)
    }

    fn close(&self) {
        if let Some(tx) = self.outgoing.lock().take() {
            tracing::debug!("Closing WebSocket connection");
            let _ = tx.send(Outgoing::Close);
        }
    }
}

/// 连接任务：握手、收发消息，结束时送出 Closed 事件
async fn run_connection(
    request: Request,
    timeout: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    sink: EventSink,
) {
    let stream = match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(Ok((stream, response))) => {
            tracing::info!("WebSocket connected ({})", response.status());
            stream
        }
        Ok(Err(e)) => {
            tracing::error!("WebSocket connection failed: {}", e);
            sink.send(TransportEvent::Error(e.to_string()));
            return;
        }
        Err(_) => {
            tracing::error!("WebSocket connection timed out after {:?}", timeout);
            sink.send(TransportEvent::Error("Connection timed out".to_string()));
            return;
        }
    };

    sink.set_connected(true);
    sink.send(TransportEvent::Connected);

    let (mut write, mut read) = stream.split();
    let mut closing = false;
    // 关闭握手的截止时间，对端不回应时按超时结束
    let mut close_deadline: Option<Instant> = None;

    let closed = loop {
        tokio::select! {
            command = outgoing.recv(), if !closing => match command {
                Some(Outgoing::Frame { data, is_binary }) => {
                    let message = if is_binary {
                        Message::Binary(data.into())
                    } else {
                        Message::Text(String::from_utf8_lossy(&data).into_owned().into())
                    };
                    if let Err(e) = write.send(message).await {
                        tracing::error!("WebSocket send failed: {}", e);
                        break closed_event(ABNORMAL_CLOSE, e.to_string(), false);
                    }
                }
                Some(Outgoing::Close) | None => {
                    closing = true;
                    close_deadline = Some(Instant::now() + timeout);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!("WebSocket close handshake failed: {}", e);
                        break closed_event(NORMAL_CLOSE, "closed by client", false);
                    }
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    sink.send(TransportEvent::BinaryMessage(data.to_vec()));
                }
                Some(Ok(Message::Text(text))) => {
                    sink.send(TransportEvent::TextMessage(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(frame))) => break close_frame_event(frame),
                // ping/pong 由 tungstenite 自动处理
                Some(Ok(_)) => {}
                Some(Err(e)) if closing => {
                    tracing::debug!("WebSocket error while closing: {}", e);
                    break closed_event(NORMAL_CLOSE, "closed by client", true);
                }
                Some(Err(e)) => {
                    tracing::error!("WebSocket receive error: {}", e);
                    break closed_event(ABNORMAL_CLOSE, e.to_string(), false);
                }
                None => break closed_event(ABNORMAL_CLOSE, "stream ended", closing),
            },
            _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)),
                if close_deadline.is_some() =>
            {
                tracing::warn!("WebSocket close handshake timed out after {:?}", timeout);
                break closed_event(NORMAL_CLOSE, "close handshake timed out", false);
            }
        }
    };

    if tokio::time::timeout(timeout, write.close()).await.is_err() {
        tracing::debug!("WebSocket sink close timed out");
    }
    sink.set_connected(false);
    sink.send(closed);
}

fn closed_event(code: u16, reason: impl Into<String>, clean: bool) -> TransportEvent {
    TransportEvent::Closed {
        code,
        reason: reason.into(),
        clean,
    }
}

fn close_frame_event(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => closed_event(u16::from(frame.code), frame.reason.as_str(), true),
        None => closed_event(NORMAL_CLOSE, "", true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.url, "wss://api.wit.ai/composer");
        assert!(config.protocol.is_none());
        assert_eq!(config.connect_timeout_secs, 30);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SocketSettings {
            server_url: "ws://127.0.0.1:9000".to_string(),
            protocol: Some("wss".to_string()),
            connect_timeout_secs: 3,
        };
        let config = WebSocketConfig::from(&settings);
        assert_eq!(config.url, "ws://127.0.0.1:9000");
        assert_eq!(config.protocol.as_deref(), Some("wss"));
    }

    #[test]
    fn test_client_request_sets_protocol() {
        let config = WebSocketConfig {
            protocol: Some("wss".to_string()),
            ..Default::default()
        };
        let request = config.client_request().unwrap();
        assert_eq!(request.headers()["Sec-WebSocket-Protocol"], "wss");
        assert_eq!(request.uri().host(), Some("api.wit.ai"));
    }

    #[test]
    fn test_client_request_rejects_bad_url() {
        let config = WebSocketConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.client_request(),
            Err(NetworkError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_new_requires_runtime() {
        assert!(WebSocketTransport::new(WebSocketConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let (transport, _events) = WebSocketTransport::new(WebSocketConfig::default()).unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.send(vec![1], true), Err(NetworkError::NotConnected));
        transport.close();
    }

    #[tokio::test]
    async fn test_close_without_peer_reply_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // 握手后不再读取，不回应关闭帧
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = WebSocketConfig {
            url: format!("ws://127.0.0.1:{}", port),
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let (transport, mut events) = WebSocketTransport::new(config).unwrap();
        transport.connect().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(TransportEvent::Connected));

        transport.close();
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(TransportEvent::Closed { clean: false, .. })
        ));
        assert!(!transport.is_connected());
        server.abort();
    }

    #[tokio::test]
    async fn test_connection_refused_reports_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = WebSocketConfig {
            url: format!("ws://127.0.0.1:{}", port),
            connect_timeout_secs: 5,
            ..Default::default()
        };
        let (transport, mut events) = WebSocketTransport::new(config).unwrap();
        transport.connect().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(TransportEvent::Error(_))));
        assert!(!transport.is_connected());
    }
}
