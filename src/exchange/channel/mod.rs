//! In-memory channel-based view exchange.
//!
//! Uses a tokio broadcast channel for pub/sub within a single process.
//! Subscribers filter by view type on their side.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::{Result, ViewExchange, ViewUpdate};
use crate::config::DEFAULT_CHANNEL_CAPACITY;

/// Filter matching every view type.
pub const ALL_VIEWS: &str = "#";

/// Check if a view type matches a filter pattern.
///
/// Matching rules:
/// - "#" matches all view types
/// - Exact match: "orders" matches "orders"
/// - Hierarchical: "orders" matches "orders.summary" (prefix match with dot separator)
fn view_type_matches(view_type: &str, filter: &str) -> bool {
    if filter == ALL_VIEWS {
        return true;
    }
    if view_type == filter {
        return true;
    }
    view_type.starts_with(filter) && view_type[filter.len()..].starts_with('.')
}

/// View exchange backed by a tokio broadcast channel.
pub struct ChannelExchange {
    sender: broadcast::Sender<Arc<ViewUpdate>>,
}

impl ChannelExchange {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an exchange buffering up to `capacity` updates per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        info!(capacity, "Channel view exchange initialized");

        Self { sender }
    }

    /// Subscribe to updates for view types matching `filter`.
    pub fn subscribe(&self, filter: impl Into<String>) -> ExchangeSubscription {
        ExchangeSubscription {
            receiver: self.sender.subscribe(),
            filter: filter.into(),
        }
    }

    /// Subscribe to updates for every view.
    pub fn subscribe_all(&self) -> ExchangeSubscription {
        self.subscribe(ALL_VIEWS)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewExchange for ChannelExchange {
    async fn push_update(&self, update: ViewUpdate) -> Result<()> {
        let key = update.key.clone();

        // No receivers is not an error: nobody is watching this view yet.
        match self.sender.send(Arc::new(update)) {
            Ok(receivers) => debug!(view = %key, receivers, "Pushed view update"),
            Err(_) => debug!(view = %key, "No subscribers for view update"),
        }
        Ok(())
    }
}

/// Receiving end of a `ChannelExchange` subscription.
pub struct ExchangeSubscription {
    receiver: broadcast::Receiver<Arc<ViewUpdate>>,
    filter: String,
}

impl ExchangeSubscription {
    /// Wait for the next update matching this subscription's filter.
    ///
    /// Returns `None` once the exchange is dropped. Updates dropped because
    /// this subscriber lagged are skipped; only the latest state matters.
    pub async fn recv(&mut self) -> Option<Arc<ViewUpdate>> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => {
                    if view_type_matches(&update.key.flow_type, &self.filter) {
                        return Some(update);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(filter = %self.filter, skipped, "Subscriber lagged, skipping updates");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests;
