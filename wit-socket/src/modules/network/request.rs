//! 出站请求构建
//!
//! 构造认证、数据请求以及二进制附带消息的 JSON 信封，并编码为帧

use crate::modules::network::frame;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use uuid::Uuid;

/// 请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Synthesize,
    Converse,
}

impl RequestType {
    /// 信封中 `data` 下的路由键
    pub fn routing_key(&self) -> &'static str {
        match self {
            RequestType::Synthesize => "synthesize",
            RequestType::Converse => "converse",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// 出站消息构建器
#[derive(Debug, Default)]
pub struct RequestBuilder;

impl RequestBuilder {
    /// 生成新的关联 ID
    pub fn new_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// 认证消息
    pub fn auth_message(token: &str) -> String {
        json!({ "wit_auth_token": token }).to_string()
    }

    /// 数据请求消息
    pub fn data_message(request_type: RequestType, body: Value, request_id: &str) -> String {
        let mut data = serde_json::Map::new();
        data.insert(request_type.routing_key().to_string(), body);
        json!({
            "data": Value::Object(data),
            "client_request_id": request_id,
        })
        .to_string()
    }

    /// 二进制数据附带的消息，只携带关联 ID
    pub fn binary_message(request_id: &str) -> String {
        json!({ "client_request_id": request_id }).to_string()
    }

    /// 认证帧 (无二进制负载)
    pub fn auth_frame(token: &str) -> Vec<u8> {
        frame::encode(&Self::auth_message(token), &[])
    }

    /// 数据请求帧，返回新生成的关联 ID 和编码结果
    pub fn data_frame(request_type: RequestType, body: Value) -> (String, Vec<u8>) {
        let request_id = Self::new_request_id();
        let message = Self::data_message(request_type, body, &request_id);
        (request_id, frame::encode(&message, &[]))
    }

    /// 二进制数据帧
    pub fn binary_frame(request_id: &str, data: &[u8]) -> Vec<u8> {
        frame::encode(&Self::binary_message(request_id), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::network::frame::{Frame, flags};

    #[test]
    fn test_routing_key() {
        assert_eq!(RequestType::Synthesize.routing_key(), "synthesize");
        assert_eq!(RequestType::Converse.to_string(), "converse");
    }

    #[test]
    fn test_auth_message() {
        let message: Value = serde_json::from_str(&RequestBuilder::auth_message("abc")).unwrap();
        assert_eq!(message, json!({ "wit_auth_token": "abc" }));
    }

    #[test]
    fn test_auth_message_escapes_token() {
        let message: Value =
            serde_json::from_str(&RequestBuilder::auth_message("a\"b")).unwrap();
        assert_eq!(message["wit_auth_token"], "a\"b");
    }

    #[test]
    fn test_data_frame_envelope() {
        let body = json!({ "q": "hello", "voice": "Rebecca" });
        let (request_id, bytes) = RequestBuilder::data_frame(RequestType::Synthesize, body.clone());

        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.flags, flags::RESERVED);
        assert!(frame.binary.is_empty());

        let envelope: Value = serde_json::from_str(&frame.json).unwrap();
        assert_eq!(envelope["data"]["synthesize"], body);
        assert_eq!(envelope["client_request_id"], request_id.as_str());
        assert!(envelope["data"].get("converse").is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let (first, _) = RequestBuilder::data_frame(RequestType::Converse, json!({}));
        let (second, _) = RequestBuilder::data_frame(RequestType::Converse, json!({}));
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_binary_frame() {
        let bytes = RequestBuilder::binary_frame("req-1", &[4, 5, 6]);
        let frame = Frame::decode(&bytes).unwrap();
        assert!(frame.has_binary());
        assert_eq!(frame.binary, vec![4, 5, 6]);
        let envelope: Value = serde_json::from_str(&frame.json).unwrap();
        assert_eq!(envelope, json!({ "client_request_id": "req-1" }));
    }
}
