//! 入站消息解析
//!
//! 将原始字节解码为帧，并解析 JSON 中的 `type` 字段

use crate::modules::network::frame::Frame;
use serde_json::Value;
use std::fmt;

/// 合成数据标记 (在原始文本中匹配)
pub const SYNTHESIZE_DATA_MARKER: &str = "SYNTHESIZE_DATA";
/// 合成结束标记 (在原始文本中匹配)
pub const END_STREAM_MARKER: &str = "END_STREAM";

/// 服务端响应类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseType {
    Initialized,
    ExecutionResult,
    EndTranscription,
    PartialTranscription,
    FinalTranscription,
    Unknown(String),
}

impl ResponseType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "INITIALIZED" => ResponseType::Initialized,
            "EXECUTION_RESULT" => ResponseType::ExecutionResult,
            "END_TRANSCRIPTION" => ResponseType::EndTranscription,
            "PARTIAL_TRANSCRIPTION" => ResponseType::PartialTranscription,
            "FINAL_TRANSCRIPTION" => ResponseType::FinalTranscription,
            other => ResponseType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResponseType::Initialized => "INITIALIZED",
            ResponseType::ExecutionResult => "EXECUTION_RESULT",
            ResponseType::EndTranscription => "END_TRANSCRIPTION",
            ResponseType::PartialTranscription => "PARTIAL_TRANSCRIPTION",
            ResponseType::FinalTranscription => "FINAL_TRANSCRIPTION",
            ResponseType::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码后的入站消息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMessage {
    /// JSON `type` 字段，缺失或解析失败时为 None
    pub response_type: Option<ResponseType>,
    /// 解析后的 JSON，解析失败时为 None
    pub json: Option<Value>,
    /// 二进制负载
    pub binary: Vec<u8>,
    /// 是否为流式合成中的原始续块 (未经帧解码)
    pub continuation: bool,
}

impl DecodedMessage {
    /// 从原始字节解码
    ///
    /// 解码或 JSON 解析失败只记录日志，返回空消息，后续仍可基于原始文本分类。
    pub fn decode(raw: &[u8]) -> Self {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to decode frame: {}", e);
                return Self::default();
            }
        };

        let json = match serde_json::from_str::<Value>(&frame.json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Could not parse JSON payload: {} ({})", e, frame.json);
                None
            }
        };

        let response_type = json
            .as_ref()
            .and_then(|v| v.get("type"))
            .and_then(|v| v.as_str())
            .filter(|tag| !tag.is_empty())
            .map(ResponseType::parse);

        Self {
            response_type,
            json,
            binary: frame.binary,
            continuation: false,
        }
    }

    /// 流式合成的原始续块，整个负载即为数据
    pub fn continuation(raw: &[u8]) -> Self {
        Self {
            response_type: None,
            json: None,
            binary: raw.to_vec(),
            continuation: true,
        }
    }

    pub fn is(&self, response_type: &ResponseType) -> bool {
        self.response_type.as_ref() == Some(response_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::network::frame::encode;
    use serde_json::json;

    #[test]
    fn test_response_type_parse() {
        assert_eq!(ResponseType::parse("INITIALIZED"), ResponseType::Initialized);
        assert_eq!(ResponseType::parse("EXECUTION_RESULT"), ResponseType::ExecutionResult);
        assert_eq!(
            ResponseType::parse("PARTIAL_TRANSCRIPTION"),
            ResponseType::PartialTranscription
        );
        assert_eq!(
            ResponseType::parse("PROCESSING"),
            ResponseType::Unknown("PROCESSING".to_string())
        );
        assert_eq!(ResponseType::FinalTranscription.to_string(), "FINAL_TRANSCRIPTION");
    }

    #[test]
    fn test_decode_with_type() {
        let raw = encode(r#"{"type":"PARTIAL_TRANSCRIPTION","text":"hi"}"#, &[7, 8]);
        let message = DecodedMessage::decode(&raw);
        assert!(message.is(&ResponseType::PartialTranscription));
        assert_eq!(message.json.unwrap()["text"], json!("hi"));
        assert_eq!(message.binary, vec![7, 8]);
        assert!(!message.continuation);
    }

    #[test]
    fn test_decode_invalid_json_keeps_binary() {
        let raw = encode("not json", &[1]);
        let message = DecodedMessage::decode(&raw);
        assert!(message.json.is_none());
        assert!(message.response_type.is_none());
        assert_eq!(message.binary, vec![1]);
    }

    #[test]
    fn test_decode_missing_type() {
        let raw = encode(r#"{"data":{}}"#, &[]);
        let message = DecodedMessage::decode(&raw);
        assert!(message.json.is_some());
        assert!(message.response_type.is_none());
    }

    #[test]
    fn test_decode_short_input_returns_empty() {
        let message = DecodedMessage::decode(b"short");
        assert_eq!(message, DecodedMessage::default());
    }

    #[test]
    fn test_continuation() {
        let message = DecodedMessage::continuation(&[1, 2, 3]);
        assert!(message.continuation);
        assert_eq!(message.binary, vec![1, 2, 3]);
        assert!(message.response_type.is_none());
    }
}
