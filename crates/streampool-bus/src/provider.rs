//! Bus capability trait and the in-memory implementation.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{BusError, BusResult};

/// A message held under a peek lock. It stays on the subscription until
/// deleted; receiving again before deletion redelivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedMessage {
    pub lock_token: String,
    pub body: String,
}

/// Topic/subscription message transport.
#[async_trait]
pub trait BusProvider: Send + Sync {
    /// Create the topic if it does not exist.
    async fn ensure_topic(&self, topic: &str) -> BusResult<()>;

    /// Create a subscription on a topic if it does not exist.
    async fn ensure_subscription(&self, topic: &str, subscription: &str) -> BusResult<()>;

    /// Publish a message to a topic, fanning out to its subscriptions.
    async fn send(&self, topic: &str, body: &str) -> BusResult<()>;

    /// Receive the next message under a peek lock, if one is pending.
    async fn receive_with_lock(
        &self,
        topic: &str,
        subscription: &str,
    ) -> BusResult<Option<LockedMessage>>;

    /// Delete a locked message, completing it.
    async fn delete_message(&self, message: &LockedMessage) -> BusResult<()>;
}

#[derive(Default)]
struct Inner {
    /// (topic, subscription) -> pending messages, front first.
    queues: BTreeMap<(String, String), VecDeque<(String, String)>>,
    next_token: u64,
}

/// In-memory bus with peek-lock-style redelivery: a received message is
/// left at the front of its queue until deleted by token.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending message count on one subscription.
    pub async fn depth(&self, topic: &str, subscription: &str) -> usize {
        self.inner
            .lock()
            .await
            .queues
            .get(&(topic.to_string(), subscription.to_string()))
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl BusProvider for InMemoryBus {
    async fn ensure_topic(&self, _topic: &str) -> BusResult<()> {
        Ok(())
    }

    async fn ensure_subscription(&self, topic: &str, subscription: &str) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .queues
            .entry((topic.to_string(), subscription.to_string()))
            .or_default();
        Ok(())
    }

    async fn send(&self, topic: &str, body: &str) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        inner.next_token += 1;
        let token = format!("msg-{}", inner.next_token);
        let mut delivered = false;
        for ((t, _), queue) in inner.queues.iter_mut() {
            if t == topic {
                queue.push_back((token.clone(), body.to_string()));
                delivered = true;
            }
        }
        if !delivered {
            return Err(BusError::TopicNotFound(topic.to_string()));
        }
        Ok(())
    }

    async fn receive_with_lock(
        &self,
        topic: &str,
        subscription: &str,
    ) -> BusResult<Option<LockedMessage>> {
        let inner = self.inner.lock().await;
        let queue = inner
            .queues
            .get(&(topic.to_string(), subscription.to_string()))
            .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;
        Ok(queue.front().map(|(token, body)| LockedMessage {
            lock_token: token.clone(),
            body: body.clone(),
        }))
    }

    async fn delete_message(&self, message: &LockedMessage) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        let mut deleted = false;
        for queue in inner.queues.values_mut() {
            let before = queue.len();
            queue.retain(|(token, _)| token != &message.lock_token);
            deleted |= queue.len() != before;
        }
        if !deleted {
            return Err(BusError::UnknownLockToken(message.lock_token.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn undeleted_message_is_redelivered() {
        let bus = InMemoryBus::new();
        bus.ensure_topic("deploys").await.unwrap();
        bus.ensure_subscription("deploys", "worker").await.unwrap();
        bus.send("deploys", "hello").await.unwrap();

        let first = bus.receive_with_lock("deploys", "worker").await.unwrap().unwrap();
        let second = bus.receive_with_lock("deploys", "worker").await.unwrap().unwrap();
        assert_eq!(first, second);

        bus.delete_message(&first).await.unwrap();
        assert!(bus.receive_with_lock("deploys", "worker").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_fans_out_to_all_subscriptions() {
        let bus = InMemoryBus::new();
        bus.ensure_subscription("deploys", "worker-a").await.unwrap();
        bus.ensure_subscription("deploys", "worker-b").await.unwrap();
        bus.send("deploys", "hello").await.unwrap();

        assert_eq!(bus.depth("deploys", "worker-a").await, 1);
        assert_eq!(bus.depth("deploys", "worker-b").await, 1);
    }

    #[tokio::test]
    async fn send_without_subscription_is_an_error() {
        let bus = InMemoryBus::new();
        assert!(matches!(
            bus.send("nowhere", "hello").await.unwrap_err(),
            BusError::TopicNotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_with_stale_token_is_an_error() {
        let bus = InMemoryBus::new();
        bus.ensure_subscription("deploys", "worker").await.unwrap();
        let stale = LockedMessage {
            lock_token: "msg-99".to_string(),
            body: String::new(),
        };
        assert!(matches!(
            bus.delete_message(&stale).await.unwrap_err(),
            BusError::UnknownLockToken(_)
        ));
    }
}
