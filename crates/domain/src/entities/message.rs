//! 聊天消息实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 广播给所有连接的聊天消息
///
/// 序列化后的 JSON 即为下发给客户端的帧：
/// `{"username": ..., "content": ..., "time": ...}`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// 发送者显示名
    pub username: String,
    pub content: String,
    pub time: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, content: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            time,
        }
    }
}

/// 客户端上行帧
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub content: String,
}

impl InboundFrame {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
