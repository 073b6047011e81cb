//! WebSocket 传输适配器与升级处理

use std::sync::Arc;

use application::{ApplicationError, FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use domain::AuthError;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tracing::{debug, warn};

use crate::{auth::AuthenticatedPrincipal, error::ApiError, state::AppState};

pub struct WsFrameSource {
    stream: SplitStream<WebSocket>,
}

impl WsFrameSource {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Some(bytes.to_vec())),
                // 控制帧由协议层应答
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(err)) => return Err(TransportError::io(err.to_string())),
            }
        }
    }
}

pub struct WsFrameSink {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WsFrameSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::Text(frame.to_owned().into()))
            .await
            .map_err(|err| TransportError::io(err.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink
            .close()
            .await
            .map_err(|err| TransportError::io(err.to_string()))
    }
}

/// 实时连接升级
///
/// 门卫已校验令牌；这里解析显示名，升级成功后才在连接中心登记。
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let profile = state
        .auth_service
        .profile(&principal)
        .await
        .map_err(|err| match err {
            ApplicationError::UserNotFound => {
                warn!(user_id = %principal, "upgrade for unknown principal rejected");
                ApiError::from(AuthError::ConnectionRejected)
            }
            other => ApiError::from(other),
        })?;

    let chat = Arc::clone(&state.chat_service);
    Ok(ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let mut sink = WsFrameSink::new(sink);

        match chat.admit(principal.clone(), profile.username).await {
            Ok(agent) => {
                debug!(connection_id = %agent.id(), user_id = %principal, "websocket connected");
                agent.run(WsFrameSource::new(stream), sink).await;
            }
            Err(err) => {
                warn!(user_id = %principal, error = %err, "connection not admitted");
                if let Err(err) = sink.close().await {
                    debug!(error = %err, "close after rejection failed");
                }
            }
        }
    }))
}
