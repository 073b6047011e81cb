//! 连接中心
//!
//! 进程内唯一的广播结构：登记所有在线连接，并把消息扇出到每个连接的
//! 有界出站队列。注册表只通过本模块的方法修改。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use config::HubConfig;
use domain::PrincipalId;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 出站帧，广播时在所有接收者之间共享
pub type OutboundFrame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("connection limit reached ({0})")]
    Full(usize),
}

/// 注册成功后交给连接代理的凭据：连接 ID 和出站队列的接收端
#[derive(Debug)]
pub struct ConnectionTicket {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<OutboundFrame>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// 因队列已满或已关闭而被移出注册表的连接数
    pub dropped: usize,
}

struct Registration {
    principal: PrincipalId,
    display_name: String,
    outbound: mpsc::Sender<OutboundFrame>,
}

pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Registration>>,
    outbound_capacity: usize,
    max_connections: Option<usize>,
}

impl ConnectionHub {
    pub fn new(outbound_capacity: usize, max_connections: Option<usize>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
            max_connections,
        }
    }

    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(config.outbound_capacity, config.max_connections)
    }

    /// 登记一个新连接，返回其出站队列
    pub async fn register(
        &self,
        principal: PrincipalId,
        display_name: impl Into<String>,
    ) -> Result<ConnectionTicket, HubError> {
        let (sender, receiver) = mpsc::channel(self.outbound_capacity);
        let id = ConnectionId::generate();
        let display_name = display_name.into();

        let mut connections = self.connections.write().await;
        if let Some(limit) = self.max_connections {
            if connections.len() >= limit {
                warn!(user_id = %principal, limit, "connection limit reached, rejecting");
                return Err(HubError::Full(limit));
            }
        }

        info!(
            connection_id = %id,
            user_id = %principal,
            username = %display_name,
            "connection registered"
        );
        connections.insert(
            id,
            Registration {
                principal,
                display_name,
                outbound: sender,
            },
        );

        Ok(ConnectionTicket {
            id,
            outbound: receiver,
        })
    }

    /// 移除连接并丢弃其发送端，使写循环结束。重复调用返回 `false`
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        match removed {
            Some(registration) => {
                info!(
                    connection_id = %id,
                    user_id = %registration.principal,
                    "connection unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// 把消息投递到每个已注册连接的出站队列
    ///
    /// 投递不会等待：队列已满的接收者直接被移出注册表，
    /// 一个慢消费者不能阻塞其它连接。
    pub async fn broadcast(&self, payload: OutboundFrame) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let stale: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            let mut stale = Vec::new();
            for (id, registration) in connections.iter() {
                match registration.outbound.try_send(Arc::clone(&payload)) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            connection_id = %id,
                            username = %registration.display_name,
                            "outbound queue full, dropping slow consumer"
                        );
                        stale.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(connection_id = %id, "outbound queue closed");
                        stale.push(*id);
                    }
                }
            }
            stale
        };

        if !stale.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &stale {
                connections.remove(id);
            }
        }
        report.dropped = stale.len();
        report
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }
}
