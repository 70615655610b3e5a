//! Mock view exchange for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExchangeError, Result, ViewExchange, ViewUpdate};
use crate::test_utils::{Call, CallLog};

/// Mock exchange that records pushed updates.
#[derive(Default)]
pub struct MockExchange {
    updates: RwLock<Vec<ViewUpdate>>,
    attempts: RwLock<usize>,
    fail_on_push: RwLock<bool>,
    log: Option<CallLog>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record calls into a log shared with other mocks.
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    pub async fn set_fail_on_push(&self, fail: bool) {
        *self.fail_on_push.write().await = fail;
    }

    /// Number of push attempts, including failed ones.
    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }

    pub async fn take_updates(&self) -> Vec<ViewUpdate> {
        std::mem::take(&mut *self.updates.write().await)
    }
}

#[async_trait]
impl ViewExchange for MockExchange {
    async fn push_update(&self, update: ViewUpdate) -> Result<()> {
        *self.attempts.write().await += 1;
        if let Some(log) = &self.log {
            log.record(Call::PushUpdate {
                key: update.key.clone(),
            })
            .await;
        }

        if *self.fail_on_push.read().await {
            return Err(ExchangeError::Publish("Mock publish failure".to_string()));
        }
        self.updates.write().await.push(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowKey;

    fn make_update() -> ViewUpdate {
        ViewUpdate {
            key: FlowKey::singleton("orders"),
            checkpoint: None,
            state: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_mock_exchange_push() {
        let exchange = MockExchange::new();

        exchange.push_update(make_update()).await.unwrap();

        assert_eq!(exchange.attempt_count().await, 1);
        assert_eq!(exchange.take_updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_exchange_fail_on_push() {
        let exchange = MockExchange::new();
        exchange.set_fail_on_push(true).await;

        let result = exchange.push_update(make_update()).await;

        assert!(result.is_err());
        assert_eq!(exchange.attempt_count().await, 1);
        assert!(exchange.take_updates().await.is_empty());
    }
}
