//! 网络通信模块
//!
//! 提供帧编解码、会话状态机、流式分发和 WebSocket 传输层

pub mod client;
pub mod dispatcher;
pub mod frame;
pub mod message;
pub mod request;
pub mod session;
pub mod transport;
pub mod websocket;

pub use client::{WitSocketClient, spawn_event_pump};
pub use dispatcher::{Classification, StreamDispatcher};
pub use frame::{Frame, HEADER_SIZE};
pub use message::{DecodedMessage, ResponseType};
pub use request::{RequestBuilder, RequestType};
pub use session::{SessionState, SocketState, WitSocketSession};
pub use transport::{Transport, TransportEvent};
pub use websocket::{WebSocketConfig, WebSocketTransport};
