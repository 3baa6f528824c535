//! 事件模块
//!
//! 定义会话向调用方发出的通知，以及观察者注册表

use crate::modules::network::session::SocketState;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 会话通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type")]
pub enum SocketEvent {
    /// 连接状态变化
    StateChanged { old_state: SocketState, new_state: SocketState },
    /// 流式数据到达
    StreamProgress {
        chunk: Vec<u8>,
        json: Option<serde_json::Value>,
    },
    /// 流结束
    StreamComplete,
    /// 流错误
    StreamError { code: String, message: String },
}

impl SocketEvent {
    pub fn progress(chunk: Vec<u8>, json: Option<serde_json::Value>) -> Self {
        SocketEvent::StreamProgress { chunk, json }
    }

    pub fn error(code: impl ToString, message: impl Into<String>) -> Self {
        SocketEvent::StreamError {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// 观察者回调类型
pub type EventCallback = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// 观察者注册表
///
/// 回调在触发事件的线程上同步、按序执行。执行回调前先释放锁，
/// 回调中可以再次调用会话接口。
#[derive(Default, Clone)]
pub struct EventObservers {
    callbacks: Arc<Mutex<Vec<EventCallback>>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SocketEvent>>>>,
}

impl std::fmt::Debug for EventObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventObservers")
            .field("callbacks", &self.callbacks.lock().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册回调
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// 以 channel 形式订阅，接收端关闭后自动移除
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// 分发事件
    pub fn emit(&self, event: &SocketEvent) {
        tracing::trace!("Emitting socket event: {:?}", event);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());

        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks.iter() {
            callback(event);
        }
    }

    /// 按序分发多个事件
    pub fn emit_all(&self, events: &[SocketEvent]) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len() + self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_socket_event_serialization() {
        let event = SocketEvent::StateChanged {
            old_state: SocketState::Connecting,
            new_state: SocketState::Connected,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "StateChanged");
        assert_eq!(json["new_state"], "Connected");
    }

    #[test]
    fn test_observers_called_in_order() {
        let observers = EventObservers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        observers.on_event(move |_| first.lock().push("first"));
        let second = seen.clone();
        observers.on_event(move |_| second.lock().push("second"));

        observers.emit(&SocketEvent::StreamComplete);
        assert_eq!(*seen.lock(), vec!["first", "second"]);
        assert_eq!(observers.len(), 2);
    }

    #[test]
    fn test_emit_all_preserves_order() {
        let observers = EventObservers::new();
        let mut rx = observers.subscribe();

        observers.emit_all(&[
            SocketEvent::progress(vec![1], None),
            SocketEvent::StreamComplete,
        ]);

        assert_eq!(rx.try_recv().unwrap(), SocketEvent::progress(vec![1], None));
        assert_eq!(rx.try_recv().unwrap(), SocketEvent::StreamComplete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_removed() {
        let observers = EventObservers::new();
        let count = Arc::new(AtomicUsize::new(0));
        drop(observers.subscribe());
        let counter = count.clone();
        observers.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(observers.len(), 2);

        observers.emit(&SocketEvent::error("NETWORK_LOST", "closed"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(observers.len(), 1);
    }
}
