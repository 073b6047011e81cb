use std::sync::Arc;
use std::time::Duration;

use config::HubConfig;
use domain::{ChatMessage, MessageStore, PrincipalId};

use crate::agent::ConnectionAgent;
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::hub::{ConnectionHub, HubError};

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 100;

/// 聊天用例：历史查询和实时连接的接纳
pub struct ChatService {
    hub: Arc<ConnectionHub>,
    messages: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Option<Duration>,
}

impl ChatService {
    pub fn new(
        hub: Arc<ConnectionHub>,
        messages: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            hub,
            messages,
            clock,
            idle_timeout,
        }
    }

    pub fn from_config(
        config: &HubConfig,
        messages: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            Arc::new(ConnectionHub::from_config(config)),
            messages,
            clock,
            config.idle_timeout_seconds.map(Duration::from_secs),
        )
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// 按时间倒序分页读取历史消息
    pub async fn history(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0);
        Ok(self.messages.list(limit, offset).await?)
    }

    /// 在连接中心登记一个已认证的连接，返回负责该连接的代理
    pub async fn admit(
        &self,
        principal: PrincipalId,
        display_name: String,
    ) -> Result<ConnectionAgent, HubError> {
        let ticket = self
            .hub
            .register(principal.clone(), display_name.clone())
            .await?;

        Ok(ConnectionAgent::new(
            ticket,
            principal,
            display_name,
            Arc::clone(&self.hub),
            Arc::clone(&self.messages),
            Arc::clone(&self.clock),
            self.idle_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use domain::MockMessageStore;

    fn service(messages: MockMessageStore) -> ChatService {
        ChatService::new(
            Arc::new(ConnectionHub::new(4, Some(1))),
            Arc::new(messages),
            Arc::new(SystemClock),
            None,
        )
    }

    #[tokio::test]
    async fn history_applies_default_and_maximum_limit() {
        let mut messages = MockMessageStore::new();
        messages
            .expect_list()
            .withf(|limit, offset| *limit == 50 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        messages
            .expect_list()
            .withf(|limit, offset| *limit == 100 && *offset == 20)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let service = service(messages);
        service.history(None, None).await.unwrap();
        service.history(Some(500), Some(20)).await.unwrap();
    }

    #[tokio::test]
    async fn admit_respects_connection_limit() {
        let service = service(MockMessageStore::new());
        let agent = service
            .admit(PrincipalId::new("1"), "alice".into())
            .await
            .unwrap();
        assert!(service.hub().contains(agent.id()).await);

        let Err(err) = service.admit(PrincipalId::new("2"), "bob".into()).await else {
            panic!("second connection should be rejected");
        };
        assert_eq!(err, HubError::Full(1));
    }
}
