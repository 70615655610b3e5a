//! View exchange: real-time updates for view subscribers.
//!
//! This module contains:
//! - `ViewExchange` trait: best-effort delivery of view updates
//! - `ViewUpdate`: the state pushed to subscribers
//! - Implementations: in-process channel, mock
//!
//! Delivery is best-effort. Views never fail because an update could not
//! be pushed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::flow::FlowKey;
use crate::timeline::Position;

pub mod channel;
pub mod mock;

pub use channel::{ChannelExchange, ExchangeSubscription};
pub use mock::MockExchange;

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors that can occur while pushing updates.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Current state of a view, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewUpdate {
    pub key: FlowKey,
    pub checkpoint: Option<Position>,
    pub state: serde_json::Value,
}

/// Interface for pushing view updates to subscribers.
///
/// Shared by every view instance in the process.
///
/// Implementations:
/// - `ChannelExchange`: tokio broadcast channel
/// - `MockExchange`: call recorder with failure injection for tests
#[async_trait]
pub trait ViewExchange: Send + Sync {
    async fn push_update(&self, update: ViewUpdate) -> Result<()>;
}
