//! 双工连接传输抽象
//!
//! 连接代理只依赖这两个接口，WebSocket 适配器在 web-api 层实现。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("idle timeout elapsed")]
    IdleTimeout,
    #[error("transport error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// 入站帧来源
#[async_trait]
pub trait FrameSource: Send {
    /// 读取下一个完整帧；`Ok(None)` 表示对端已正常关闭
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// 出站帧写入端
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError>;

    /// 关闭连接；对已关闭的连接再次调用必须是空操作
    async fn close(&mut self) -> Result<(), TransportError>;
}
