//! Wit Socket 客户端
//!
//! 封装 WebSocket 传输层与会话，负责把传输层事件泵入会话

use crate::error::NetworkError;
use crate::events::SocketEvent;
use crate::modules::network::request::RequestType;
use crate::modules::network::session::{SocketState, WitSocketSession};
use crate::modules::network::transport::{Transport, TransportEvent};
use crate::modules::network::websocket::{WebSocketConfig, WebSocketTransport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 启动事件泵：按到达顺序把传输层事件交给会话处理
pub fn spawn_event_pump<T: Transport + 'static>(
    runtime: &tokio::runtime::Handle,
    session: Arc<WitSocketSession<T>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(event) = events.recv().await {
            session.handle_transport_event(event);
        }
        tracing::debug!("Transport event pump stopped");
    })
}

/// Wit Socket 客户端
#[derive(Debug)]
pub struct WitSocketClient {
    session: Arc<WitSocketSession<WebSocketTransport>>,
    pump: JoinHandle<()>,
}

impl WitSocketClient {
    /// 在当前 tokio 运行时上创建客户端
    pub fn new(config: WebSocketConfig) -> Result<Self, NetworkError> {
        let (transport, events) = WebSocketTransport::new(config)?;
        let runtime = transport.runtime().clone();
        let session = Arc::new(WitSocketSession::new(transport));
        let pump = spawn_event_pump(&runtime, session.clone(), events);
        Ok(Self { session, pump })
    }

    pub fn session(&self) -> &Arc<WitSocketSession<WebSocketTransport>> {
        &self.session
    }

    /// 连接并使用 token 认证
    pub fn connect(&self, auth_token: impl Into<String>) -> Result<(), NetworkError> {
        self.session.connect(auth_token)
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub fn state(&self) -> SocketState {
        self.session.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn is_synthesize_in_progress(&self) -> bool {
        self.session.is_synthesize_in_progress()
    }

    pub fn is_converse_in_progress(&self) -> bool {
        self.session.is_converse_in_progress()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        self.session.subscribe()
    }

    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.session.on_event(callback);
    }

    pub fn send_json(&self, request_type: RequestType, body: Value) -> Result<String, NetworkError> {
        self.session.send_json(request_type, body)
    }

    pub fn send_binary(&self, data: &[u8]) -> Result<(), NetworkError> {
        self.session.send_binary(data)
    }

    /// 发起合成请求
    pub fn synthesize(&self, body: Value) -> Result<String, NetworkError> {
        self.send_json(RequestType::Synthesize, body)
    }

    /// 发起对话请求
    pub fn converse(&self, body: Value) -> Result<String, NetworkError> {
        self.send_json(RequestType::Converse, body)
    }

    /// 等待进入指定状态，连接中途断开或超时返回错误
    pub async fn wait_for_state(
        &self,
        target: SocketState,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        let mut events = self.subscribe();
        if self.state() == target {
            return Ok(());
        }

        let wait = async {
            while let Some(event) = events.recv().await {
                match event {
                    SocketEvent::StateChanged { new_state, .. } if new_state == target => {
                        return Ok(());
                    }
                    SocketEvent::StateChanged {
                        new_state: SocketState::Disconnected,
                        ..
                    } => return Err(NetworkError::ConnectionLost),
                    _ => {}
                }
            }
            Err(NetworkError::ConnectionLost)
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            NetworkError::ConnectionFailed(format!("timed out waiting for state {}", target))
        })?
    }
}

impl Drop for WitSocketClient {
    fn drop(&mut self) {
        self.session.close();
        self.pump.abort();
    }
}
