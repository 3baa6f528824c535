//! 流式响应分发
//!
//! 对每条入站二进制消息分类，更新会话标记并产出通知。
//! 每条消息最多产出一个 progress 通知：流进行中的消息若没有专属 progress，
//! 统一产出一次。

use crate::events::SocketEvent;
use crate::modules::network::frame::Frame;
use crate::modules::network::message::{
    DecodedMessage, END_STREAM_MARKER, ResponseType, SYNTHESIZE_DATA_MARKER,
};
use crate::modules::network::session::SessionState;

/// 消息分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    SynthesizeData,
    Initialized,
    ExecutionResult,
    EndStream,
    EndTranscription,
    PartialTranscription,
    FinalTranscription,
    Unrecognized,
}

/// 按优先级分类，先匹配者胜出
///
/// 原始标记直接在未解码字节中查找，JSON 解析失败时依然生效。
pub fn classify(raw: &[u8], message: &DecodedMessage) -> Classification {
    let response_type = message.response_type.as_ref();

    if contains_marker(raw, SYNTHESIZE_DATA_MARKER) {
        Classification::SynthesizeData
    } else if response_type == Some(&ResponseType::Initialized) {
        Classification::Initialized
    } else if response_type == Some(&ResponseType::ExecutionResult) {
        Classification::ExecutionResult
    } else if contains_marker(raw, END_STREAM_MARKER) {
        Classification::EndStream
    } else {
        match response_type {
            Some(ResponseType::EndTranscription) => Classification::EndTranscription,
            Some(ResponseType::PartialTranscription) => Classification::PartialTranscription,
            Some(ResponseType::FinalTranscription) => Classification::FinalTranscription,
            _ => Classification::Unrecognized,
        }
    }
}

fn contains_marker(raw: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    raw.len() >= marker.len() && raw.windows(marker.len()).any(|w| w == marker)
}

/// 流式分发器
#[derive(Debug, Default)]
pub struct StreamDispatcher;

impl StreamDispatcher {
    /// 处理一条入站消息，返回需要按序分发的通知
    pub fn dispatch(state: &mut SessionState, raw: &[u8]) -> Vec<SocketEvent> {
        // 合成流进行中时，非完整帧即为原始音频续块
        let message = if state.synthesize_in_progress && !Frame::is_well_formed(raw) {
            DecodedMessage::continuation(raw)
        } else {
            DecodedMessage::decode(raw)
        };

        let classification = classify(raw, &message);
        let mut events = Vec::new();

        match classification {
            Classification::SynthesizeData => {
                tracing::trace!("Synthesize data: {} bytes", message.binary.len());
                state.synthesize_in_progress = true;
                events.push(SocketEvent::progress(message.binary, message.json));
                return events;
            }
            Classification::Initialized => {
                tracing::debug!("Converse initialized");
                state.converse_in_progress = true;
                return events;
            }
            Classification::ExecutionResult => {
                tracing::debug!("Execution result received");
                events.extend(state.mark_authenticated());
            }
            Classification::EndStream => {
                tracing::debug!("Synthesize ended");
                state.synthesize_in_progress = false;
                events.push(SocketEvent::StreamComplete);
                return events;
            }
            Classification::EndTranscription => {
                tracing::debug!("Transcription ended");
                state.converse_in_progress = false;
                events.push(SocketEvent::StreamComplete);
                return events;
            }
            Classification::PartialTranscription => {
                tracing::debug!("Partial transcription");
                events.push(SocketEvent::progress(message.binary, message.json));
                return events;
            }
            Classification::FinalTranscription => {
                tracing::debug!("Final transcription");
                state.synthesize_in_progress = false;
                events.push(SocketEvent::StreamComplete);
                return events;
            }
            Classification::Unrecognized => {
                tracing::debug!(
                    "Undefined message: {}",
                    message
                        .response_type
                        .as_ref()
                        .map(ResponseType::as_str)
                        .unwrap_or("<none>")
                );
            }
        }

        // 流进行中，未产出专属 progress 的消息统一产出一次 progress
        if state.is_streaming() {
            if let Some(event) = generic_progress(raw, message) {
                events.push(event);
            }
        }

        events
    }
}

/// 续块携带原始字节；可解码的帧携带二进制负载与 JSON；无法解码时退回原始字节
fn generic_progress(raw: &[u8], message: DecodedMessage) -> Option<SocketEvent> {
    if raw.is_empty() {
        return None;
    }
    if message.continuation || message.json.is_some() || !message.binary.is_empty() {
        Some(SocketEvent::progress(message.binary, message.json))
    } else {
        Some(SocketEvent::progress(raw.to_vec(), None))
    }
}
