//! 帧编解码
//!
//! WebSocket 二进制通道上的帧格式：
//! ```text
//! ┌───────┬─────────────┬───────────────┬────────────┬──────────────┐
//! │ Flags │ JSON Length │ Binary Length │ JSON bytes │ Binary bytes │
//! │ 1 byte│ u64 LE      │ u64 LE        │            │              │
//! └───────┴─────────────┴───────────────┴────────────┴──────────────┘
//! ```
//!
//! 长度字段固定为小端 64 位，编码与解码宽度一致。

use crate::error::FrameError;

/// 帧头长度 (固定 17 字节)
pub const HEADER_SIZE: usize = 17;

/// Flags 位定义
pub mod flags {
    /// 携带二进制负载
    pub const HAS_BINARY: u8 = 0b0000_0001;
    /// 保留位，始终置位
    pub const RESERVED: u8 = 0b0000_0010;
    /// 已知位掩码
    pub const KNOWN_MASK: u8 = HAS_BINARY | RESERVED;

    /// 根据是否携带二进制负载计算 flags
    #[inline]
    pub fn for_binary(has_binary: bool) -> u8 {
        if has_binary { RESERVED | HAS_BINARY } else { RESERVED }
    }
}

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u8,
    pub json_length: u64,
    pub binary_length: u64,
}

impl Header {
    /// 从缓冲区读取帧头，不读取负载
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::FrameTooShort { len: buf.len() });
        }
        let mut json_length = [0u8; 8];
        let mut binary_length = [0u8; 8];
        json_length.copy_from_slice(&buf[1..9]);
        binary_length.copy_from_slice(&buf[9..17]);
        Ok(Self {
            flags: buf[0],
            json_length: u64::from_le_bytes(json_length),
            binary_length: u64::from_le_bytes(binary_length),
        })
    }

    /// 写入帧头
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.extend_from_slice(&self.json_length.to_le_bytes());
        buf.extend_from_slice(&self.binary_length.to_le_bytes());
    }

    /// 帧总长度 (含帧头)，溢出时返回错误
    pub fn frame_length(&self) -> Result<u64, FrameError> {
        self.json_length
            .checked_add(self.binary_length)
            .and_then(|n| n.checked_add(HEADER_SIZE as u64))
            .ok_or(FrameError::LengthOverflow {
                json_length: self.json_length,
                binary_length: self.binary_length,
            })
    }
}

/// 一个完整的协议帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Flags 字节
    pub flags: u8,
    /// JSON 控制负载
    pub json: String,
    /// 二进制负载 (可为空)
    pub binary: Vec<u8>,
}

impl Frame {
    /// 创建新帧，flags 由二进制负载是否为空决定
    pub fn new(json: impl Into<String>, binary: Vec<u8>) -> Self {
        Self {
            flags: flags::for_binary(!binary.is_empty()),
            json: json.into(),
            binary,
        }
    }

    /// 仅包含 JSON 的帧
    pub fn json_only(json: impl Into<String>) -> Self {
        Self::new(json, Vec::new())
    }

    #[inline]
    pub fn has_binary(&self) -> bool {
        self.flags & flags::HAS_BINARY != 0
    }

    /// 编码为字节
    pub fn encode(&self) -> Vec<u8> {
        let header = Header {
            flags: self.flags,
            json_length: self.json.len() as u64,
            binary_length: self.binary.len() as u64,
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.json.len() + self.binary.len());
        header.encode_into(&mut buf);
        buf.extend_from_slice(self.json.as_bytes());
        buf.extend_from_slice(&self.binary);
        buf
    }

    /// 解码字节
    ///
    /// 声明长度超出缓冲区时返回 `TruncatedPayload`，不会越界读取。
    /// 声明长度之后的多余字节会被忽略。
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let header = Header::parse(buf)?;
        let declared = header.frame_length()?;
        if declared > buf.len() as u64 {
            return Err(FrameError::TruncatedPayload {
                declared,
                available: buf.len(),
            });
        }

        // declared <= buf.len()，以下转换不会截断
        let json_end = HEADER_SIZE + header.json_length as usize;
        let binary_end = json_end + header.binary_length as usize;
        if binary_end < buf.len() {
            tracing::debug!("Ignoring {} trailing bytes after frame", buf.len() - binary_end);
        }

        Ok(Self {
            flags: header.flags,
            json: String::from_utf8_lossy(&buf[HEADER_SIZE..json_end]).into_owned(),
            binary: buf[json_end..binary_end].to_vec(),
        })
    }

    /// 判断缓冲区是否恰好是一个合法帧
    ///
    /// 用于区分流式合成过程中收到的原始音频续块与正常帧。
    pub fn is_well_formed(buf: &[u8]) -> bool {
        let Ok(header) = Header::parse(buf) else {
            return false;
        };
        if header.flags & !flags::KNOWN_MASK != 0 || header.flags & flags::RESERVED == 0 {
            return false;
        }
        if (header.flags & flags::HAS_BINARY != 0) != (header.binary_length > 0) {
            return false;
        }
        matches!(header.frame_length(), Ok(len) if len == buf.len() as u64)
    }
}

/// 编码 JSON 文本和可选二进制数据
pub fn encode(json: &str, binary: &[u8]) -> Vec<u8> {
    Frame::new(json, binary.to_vec()).encode()
}

/// 解码字节为帧
pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
    Frame::decode(buf)
}
