//! 连接代理
//!
//! 每个已接纳的连接对应一个代理，读循环和写循环并发运行：
//! - 读循环解析入站帧，先持久化再广播；
//! - 写循环把出站队列中的帧写回连接。
//!
//! 写失败会通知读循环退出；读循环退出后由代理注销连接并关闭底层连接，
//! 写循环此时即使卡在写操作上也会被取消。

use std::sync::Arc;
use std::time::Duration;

use domain::{ChatMessage, InboundFrame, MessageStore, PrincipalId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::hub::{ConnectionHub, ConnectionId, ConnectionTicket, OutboundFrame};
use crate::transport::{FrameSink, FrameSource, TransportError};

pub struct ConnectionAgent {
    id: ConnectionId,
    principal: PrincipalId,
    display_name: String,
    outbound: mpsc::Receiver<OutboundFrame>,
    hub: Arc<ConnectionHub>,
    messages: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Option<Duration>,
}

impl ConnectionAgent {
    pub(crate) fn new(
        ticket: ConnectionTicket,
        principal: PrincipalId,
        display_name: String,
        hub: Arc<ConnectionHub>,
        messages: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: ticket.id,
            principal,
            display_name,
            outbound: ticket.outbound,
            hub,
            messages,
            clock,
            idle_timeout,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 运行连接直到任一方向失败或对端关闭
    pub async fn run<R, W>(self, source: R, sink: W)
    where
        R: FrameSource,
        W: FrameSink + 'static,
    {
        let Self {
            id,
            principal,
            display_name,
            outbound,
            hub,
            messages,
            clock,
            idle_timeout,
        } = self;

        let shutdown = CancellationToken::new();
        let writer = tokio::spawn(write_loop(id, outbound, sink, shutdown.clone()));

        let reader = ReadLoop {
            id,
            principal,
            display_name,
            hub: Arc::clone(&hub),
            messages,
            clock,
            idle_timeout,
        };
        reader.run(source, &shutdown).await;

        hub.unregister(id).await;
        shutdown.cancel();

        match writer.await {
            Ok(mut sink) => {
                if let Err(err) = sink.close().await {
                    debug!(connection_id = %id, error = %err, "close failed");
                }
            }
            Err(err) => {
                error!(connection_id = %id, error = %err, "write loop panicked");
            }
        }
        info!(connection_id = %id, "connection closed");
    }
}

struct ReadLoop {
    id: ConnectionId,
    principal: PrincipalId,
    display_name: String,
    hub: Arc<ConnectionHub>,
    messages: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Option<Duration>,
}

impl ReadLoop {
    async fn run<R: FrameSource>(&self, mut source: R, shutdown: &CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(connection_id = %self.id, "write side closed, stopping read loop");
                    break;
                }
                next = self.read(&mut source) => next,
            };

            match next {
                Ok(Some(bytes)) => self.handle_frame(&bytes).await,
                Ok(None) => {
                    info!(connection_id = %self.id, user_id = %self.principal, "peer closed connection");
                    break;
                }
                Err(TransportError::IdleTimeout) => {
                    info!(connection_id = %self.id, user_id = %self.principal, "idle timeout, closing connection");
                    break;
                }
                Err(err) => {
                    warn!(connection_id = %self.id, error = %err, "read failed");
                    break;
                }
            }
        }
    }

    async fn read<R: FrameSource>(
        &self,
        source: &mut R,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, source.read_frame())
                .await
                .unwrap_or(Err(TransportError::IdleTimeout)),
            None => source.read_frame().await,
        }
    }

    async fn handle_frame(&self, bytes: &[u8]) {
        let Some(frame) = InboundFrame::parse(bytes) else {
            debug!(connection_id = %self.id, "ignoring malformed frame");
            return;
        };

        let message = ChatMessage::new(self.display_name.clone(), frame.content, self.clock.now());

        // 未持久化的消息不广播
        if let Err(err) = self.messages.append(&self.principal, &message).await {
            error!(
                connection_id = %self.id,
                user_id = %self.principal,
                error = %err,
                "failed to persist message, dropping"
            );
            return;
        }

        let payload = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize chat message");
                return;
            }
        };

        let report = self.hub.broadcast(Arc::from(payload)).await;
        debug!(
            connection_id = %self.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "message broadcast"
        );
    }
}

async fn write_loop<W: FrameSink>(
    id: ConnectionId,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    mut sink: W,
    shutdown: CancellationToken,
) -> W {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => {
                    debug!(connection_id = %id, "outbound queue closed");
                    break;
                }
            },
        };

        let written = tokio::select! {
            _ = shutdown.cancelled() => break,
            written = sink.write_frame(&frame) => written,
        };
        if let Err(err) = written {
            warn!(connection_id = %id, error = %err, "write failed");
            break;
        }
    }

    shutdown.cancel();
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::services::ChatService;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use domain::StorageError;
    use infrastructure::InMemoryMessageStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
    use tokio::time::timeout;

    struct ChannelSource(UnboundedReceiver<Result<Vec<u8>, TransportError>>);

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            match self.0.recv().await {
                Some(Ok(bytes)) => Ok(Some(bytes)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            }
        }
    }

    struct RecordingSink {
        frames: UnboundedSender<String>,
        closes: Arc<AtomicUsize>,
        closed: bool,
        fail_writes: bool,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            if self.fail_writes {
                return Err(TransportError::io("broken pipe"));
            }
            self.frames
                .send(frame.to_owned())
                .map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Peer {
        inbound: UnboundedSender<Result<Vec<u8>, TransportError>>,
        frames: UnboundedReceiver<String>,
        closes: Arc<AtomicUsize>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Peer {
        fn send(&self, text: &str) {
            self.inbound.send(Ok(text.as_bytes().to_vec())).unwrap();
        }

        async fn next_frame(&mut self) -> serde_json::Value {
            let text = timeout(Duration::from_secs(1), self.frames.recv())
                .await
                .expect("frame in time")
                .expect("sink open");
            serde_json::from_str(&text).unwrap()
        }
    }

    fn connect(agent: ConnectionAgent, fail_writes: bool) -> Peer {
        let (inbound, source) = unbounded_channel();
        let (frames_tx, frames) = unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        let sink = RecordingSink {
            frames: frames_tx,
            closes: Arc::clone(&closes),
            closed: false,
            fail_writes,
        };
        let task = tokio::spawn(agent.run(ChannelSource(source), sink));
        Peer {
            inbound,
            frames,
            closes,
            task,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
    }

    fn chat(messages: Arc<dyn MessageStore>, idle_timeout: Option<Duration>) -> ChatService {
        ChatService::new(
            Arc::new(ConnectionHub::new(16, None)),
            messages,
            clock(),
            idle_timeout,
        )
    }

    #[tokio::test]
    async fn inbound_frame_is_persisted_then_broadcast_to_everyone() {
        let store = Arc::new(InMemoryMessageStore::new());
        let chat = chat(store.clone(), None);

        let mut alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);
        let mut bob = connect(chat.admit(PrincipalId::new("2"), "bob".into()).await.unwrap(), false);

        alice.send(r#"{"content":"hi"}"#);

        for peer in [&mut alice, &mut bob] {
            let frame = peer.next_frame().await;
            assert_eq!(frame["username"], "alice");
            assert_eq!(frame["content"], "hi");
            assert_eq!(frame["time"], "2024-05-01T12:00:00Z");
        }

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, PrincipalId::new("1"));
        assert_eq!(entries[0].1.username, "alice");
        assert_eq!(entries[0].1.content, "hi");
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let store = Arc::new(InMemoryMessageStore::new());
        let chat = chat(store.clone(), None);
        let mut alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);

        alice.send("not json");
        alice.send(r#"{"content":"after"}"#);

        assert_eq!(alice.next_frame().await["content"], "after");
        assert_eq!(store.entries().await.len(), 1);
    }

    struct FlakyStore {
        inner: InMemoryMessageStore,
    }

    #[async_trait]
    impl MessageStore for FlakyStore {
        async fn append(&self, sender: &PrincipalId, message: &ChatMessage) -> Result<(), StorageError> {
            if message.content == "boom" {
                return Err(StorageError::unavailable("disk on fire"));
            }
            self.inner.append(sender, message).await
        }

        async fn list(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, StorageError> {
            self.inner.list(limit, offset).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_drops_message_and_keeps_connection() {
        let chat = chat(
            Arc::new(FlakyStore {
                inner: InMemoryMessageStore::new(),
            }),
            None,
        );
        let mut alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);
        let mut bob = connect(chat.admit(PrincipalId::new("2"), "bob".into()).await.unwrap(), false);

        alice.send(r#"{"content":"boom"}"#);
        alice.send(r#"{"content":"still here"}"#);

        assert_eq!(bob.next_frame().await["content"], "still here");
        assert_eq!(alice.next_frame().await["content"], "still here");
        assert_eq!(chat.hub().len().await, 2);
    }

    #[tokio::test]
    async fn peer_close_unregisters_and_closes_once() {
        let chat = chat(Arc::new(InMemoryMessageStore::new()), None);
        let alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);
        let _bob = connect(chat.admit(PrincipalId::new("2"), "bob".into()).await.unwrap(), false);
        assert_eq!(chat.hub().len().await, 2);

        let Peer {
            inbound,
            closes,
            task,
            ..
        } = alice;
        drop(inbound);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert_eq!(chat.hub().len().await, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_error_tears_down_connection() {
        let chat = chat(Arc::new(InMemoryMessageStore::new()), None);
        let alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);

        alice.inbound.send(Err(TransportError::io("reset by peer"))).unwrap();
        timeout(Duration::from_secs(1), alice.task).await.unwrap().unwrap();

        assert!(chat.hub().is_empty().await);
        assert_eq!(alice.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_failure_stops_both_loops() {
        let chat = chat(Arc::new(InMemoryMessageStore::new()), None);
        let alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), true);

        alice.send(r#"{"content":"hi"}"#);
        // 读端仍然打开，但写失败必须结束整个连接
        timeout(Duration::from_secs(1), alice.task).await.unwrap().unwrap();

        assert!(chat.hub().is_empty().await);
        assert_eq!(alice.closes.load(Ordering::SeqCst), 1);
    }

    /// 写操作永远不会完成的连接
    struct HangingSink {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameSink for HangingSink {
        async fn write_frame(&mut self, _frame: &str) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn read_failure_closes_connection_while_write_is_stuck() {
        let chat = chat(Arc::new(InMemoryMessageStore::new()), None);
        let agent = chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap();

        let (inbound, source) = unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        let sink = HangingSink {
            closes: Arc::clone(&closes),
        };
        let task = tokio::spawn(agent.run(ChannelSource(source), sink));

        // 广播给自己，写循环随即卡在写操作上
        inbound.send(Ok(br#"{"content":"hi"}"#.to_vec())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        inbound
            .send(Err(TransportError::io("reset by peer")))
            .unwrap();

        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(chat.hub().is_empty().await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hub_eviction_ends_the_agent() {
        let chat = chat(Arc::new(InMemoryMessageStore::new()), None);
        let agent = chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap();
        let id = agent.id();
        let alice = connect(agent, false);

        assert!(chat.hub().unregister(id).await);
        timeout(Duration::from_secs(1), alice.task).await.unwrap().unwrap();
        assert_eq!(alice.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_connection_is_closed_after_timeout() {
        let chat = chat(
            Arc::new(InMemoryMessageStore::new()),
            Some(Duration::from_millis(50)),
        );
        let alice = connect(chat.admit(PrincipalId::new("1"), "alice".into()).await.unwrap(), false);

        timeout(Duration::from_secs(2), alice.task).await.unwrap().unwrap();
        assert!(chat.hub().is_empty().await);
        drop(alice.inbound);
    }
}
