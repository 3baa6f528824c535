//! 会话状态机
//!
//! 管理连接生命周期、认证状态以及合成/对话的流式进度标记

use crate::error::{ErrorCode, NetworkError};
use crate::events::{EventObservers, SocketEvent};
use crate::modules::network::dispatcher::StreamDispatcher;
use crate::modules::network::request::{RequestBuilder, RequestType};
use crate::modules::network::transport::{Transport, TransportEvent};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// 连接状态
///
/// 按声明顺序严格递进，任何状态都可以回到 `Disconnected`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SocketState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

impl SocketState {
    /// 下一个状态
    pub fn successor(self) -> Option<SocketState> {
        match self {
            SocketState::Disconnected => Some(SocketState::Connecting),
            SocketState::Connecting => Some(SocketState::Connected),
            SocketState::Connected => Some(SocketState::Authenticating),
            SocketState::Authenticating => Some(SocketState::Authenticated),
            SocketState::Authenticated => None,
        }
    }

    pub fn can_transition_to(self, next: SocketState) -> bool {
        next == SocketState::Disconnected || self.successor() == Some(next)
    }

    pub fn is_connected(self) -> bool {
        self >= SocketState::Connected
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Disconnected => write!(f, "Disconnected"),
            SocketState::Connecting => write!(f, "Connecting"),
            SocketState::Connected => write!(f, "Connected"),
            SocketState::Authenticating => write!(f, "Authenticating"),
            SocketState::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// 会话可变状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub state: SocketState,
    pub authenticated: bool,
    pub synthesize_in_progress: bool,
    pub converse_in_progress: bool,
    /// 最近一次 JSON 请求的关联 ID
    pub request_id: Option<String>,
}

impl SessionState {
    /// 状态迁移，状态发生变化时返回通知
    pub fn transition(&mut self, next: SocketState) -> Option<SocketEvent> {
        if self.state == next {
            return None;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!("Rejected socket state transition {} -> {}", self.state, next);
            return None;
        }
        let old_state = self.state;
        self.state = next;
        tracing::debug!("Socket state {} -> {}", old_state, next);
        Some(SocketEvent::StateChanged {
            old_state,
            new_state: next,
        })
    }

    /// 收到执行结果，认证完成
    pub fn mark_authenticated(&mut self) -> Option<SocketEvent> {
        if self.state == SocketState::Authenticated {
            self.authenticated = true;
            return None;
        }
        let event = self.transition(SocketState::Authenticated);
        if event.is_some() {
            self.authenticated = true;
        }
        event
    }

    /// 连接错误
    pub fn on_connection_error(&mut self) -> Option<SocketEvent> {
        self.authenticated = false;
        self.transition(SocketState::Disconnected)
    }

    /// 连接关闭
    pub fn on_closed(&mut self) -> Option<SocketEvent> {
        self.authenticated = false;
        self.synthesize_in_progress = false;
        self.converse_in_progress = false;
        self.transition(SocketState::Disconnected)
    }

    pub fn is_streaming(&self) -> bool {
        self.synthesize_in_progress || self.converse_in_progress
    }
}

/// Wit WebSocket 会话
///
/// 可独立构造，多个会话互不影响。状态由内部互斥锁保护，
/// 通知在释放状态锁之后按序同步分发。
///
/// 改变状态的操作先持有 `emit_lock` 再修改状态，直到通知分发完毕，
/// 因此各线程看到的通知顺序与状态变化顺序一致。回调中可以重入会话接口。
pub struct WitSocketSession<T: Transport> {
    transport: T,
    state: Mutex<SessionState>,
    emit_lock: ReentrantMutex<()>,
    auth_token: Mutex<Option<String>>,
    observers: EventObservers,
}

impl<T: Transport> fmt::Debug for WitSocketSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WitSocketSession")
            .field("state", &*self.state.lock())
            .field("observers", &self.observers)
            .finish()
    }
}

impl<T: Transport> WitSocketSession<T> {
    /// 创建新会话
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState::default()),
            emit_lock: ReentrantMutex::new(()),
            auth_token: Mutex::new(None),
            observers: EventObservers::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observers(&self) -> &EventObservers {
        &self.observers
    }

    /// 注册通知回调
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.observers.on_event(callback);
    }

    /// 以 channel 形式订阅通知
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        self.observers.subscribe()
    }

    /// 当前连接状态
    pub fn state(&self) -> SocketState {
        self.state.lock().state
    }

    /// 状态快照
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub fn is_synthesize_in_progress(&self) -> bool {
        self.state.lock().synthesize_in_progress
    }

    pub fn is_converse_in_progress(&self) -> bool {
        self.state.lock().converse_in_progress
    }

    /// 最近一次请求的关联 ID
    pub fn request_id(&self) -> Option<String> {
        self.state.lock().request_id.clone()
    }

    /// 发起连接，连接成功后自动发送认证帧
    pub fn connect(&self, auth_token: impl Into<String>) -> Result<(), NetworkError> {
        let _emit = self.emit_lock.lock();
        let event = {
            let mut state = self.state.lock();
            if state.state != SocketState::Disconnected {
                tracing::warn!("connect: Socket already connected ({})", state.state);
                return Err(NetworkError::AlreadyConnected);
            }
            *self.auth_token.lock() = Some(auth_token.into());
            state.transition(SocketState::Connecting)
        };
        self.emit(event);

        if let Err(e) = self.transport.connect() {
            tracing::error!("connect: Transport failed to start: {}", e);
            let event = self.state.lock().on_connection_error();
            self.emit(event);
            return Err(e);
        }
        Ok(())
    }

    /// 关闭连接
    ///
    /// 可在任意状态调用，返回前同步清除认证与进度标记。
    pub fn close(&self) {
        let _emit = self.emit_lock.lock();
        self.transport.close();
        let event = self.state.lock().on_closed();
        if event.is_some() {
            tracing::info!("Socket closed by client");
        }
        self.emit(event);
    }

    /// 发送 JSON 请求，返回新生成的关联 ID
    pub fn send_json(&self, request_type: RequestType, body: Value) -> Result<String, NetworkError> {
        self.ensure_ready("send_json")?;

        let (request_id, bytes) = RequestBuilder::data_frame(request_type, body);
        self.state.lock().request_id = Some(request_id.clone());
        tracing::debug!(
            "send_json: {} request {} ({} bytes)",
            request_type,
            request_id,
            bytes.len()
        );
        self.transport.send(bytes, true)?;
        Ok(request_id)
    }

    /// 发送二进制数据，附带最近一次请求的关联 ID
    pub fn send_binary(&self, data: &[u8]) -> Result<(), NetworkError> {
        if data.is_empty() {
            tracing::warn!("send_binary: No data to send");
            return Err(NetworkError::EmptyPayload);
        }
        self.ensure_ready("send_binary")?;

        let request_id = self.state.lock().request_id.clone().unwrap_or_else(|| {
            tracing::warn!("send_binary: No request in flight, sending without correlation id");
            String::new()
        });
        let bytes = RequestBuilder::binary_frame(&request_id, data);
        tracing::debug!("send_binary: {} bytes for request {}", bytes.len(), request_id);
        self.transport.send(bytes, true)
    }

    /// 处理传输层事件
    pub fn handle_transport_event(&self, event: TransportEvent) {
        let _emit = self.emit_lock.lock();
        match event {
            TransportEvent::Connected => self.handle_connected(),
            TransportEvent::Error(message) => {
                tracing::warn!("WebSocket connection failed: {}", message);
                let event = self.state.lock().on_connection_error();
                self.emit(event);
                self.observers
                    .emit(&SocketEvent::error(ErrorCode::NetworkConnectFailed, message));
            }
            TransportEvent::Closed { code, reason, clean } => {
                tracing::info!("WebSocket connection closed: {} {} (clean: {})", code, reason, clean);
                let (event, was_streaming) = {
                    let mut state = self.state.lock();
                    let was_streaming = state.is_streaming();
                    (state.on_closed(), was_streaming)
                };
                self.emit(event);
                if was_streaming {
                    self.observers.emit(&SocketEvent::error(
                        ErrorCode::NetworkLost,
                        format!("connection closed mid-stream: {} {}", code, reason),
                    ));
                }
            }
            TransportEvent::BinaryMessage(raw) => {
                tracing::trace!("WebSocket binary message received ({} bytes)", raw.len());
                let events = {
                    let mut state = self.state.lock();
                    StreamDispatcher::dispatch(&mut state, &raw)
                };
                self.observers.emit_all(&events);
            }
            TransportEvent::TextMessage(text) => {
                // 协议只使用二进制帧
                tracing::debug!("Ignoring text message ({} bytes)", text.len());
            }
        }
    }

    fn handle_connected(&self) {
        let event = self.state.lock().transition(SocketState::Connected);
        let Some(event) = event else {
            tracing::warn!("Unexpected connected event in state {}", self.state());
            return;
        };
        tracing::info!("WebSocket connection established");
        self.observers.emit(&event);

        let token = self.auth_token.lock().clone().unwrap_or_default();
        if let Err(e) = self.transport.send(RequestBuilder::auth_frame(&token), true) {
            tracing::error!("Failed to send authentication frame: {}", e);
            self.transport.close();
            let event = self.state.lock().on_connection_error();
            self.emit(event);
            self.observers.emit(&SocketEvent::error(
                ErrorCode::NetworkConnectFailed,
                format!("failed to send authentication frame: {}", e),
            ));
            return;
        }

        let event = self.state.lock().transition(SocketState::Authenticating);
        self.emit(event);
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), NetworkError> {
        if !self.transport.is_connected() {
            tracing::warn!("{}: Not connected", operation);
            return Err(NetworkError::NotConnected);
        }
        if !self.state.lock().authenticated {
            tracing::warn!("{}: WebSocket not authenticated", operation);
            return Err(NetworkError::NotAuthenticated);
        }
        Ok(())
    }

    fn emit(&self, event: Option<SocketEvent>) {
        if let Some(event) = event {
            self.observers.emit(&event);
        }
    }
}

impl<T: Transport> Drop for WitSocketSession<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
