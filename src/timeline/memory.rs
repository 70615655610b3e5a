//! In-memory timeline.
//!
//! Keeps the latest snapshot per view and every stop record in process
//! memory. Ideal for local development, tests and the `viewflow` binary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Point, Result, StopRecord, Timeline, TimelineError, ViewSnapshot};
use crate::flow::FlowKey;

/// Timeline backed by process memory.
#[derive(Default)]
pub struct InMemoryTimeline {
    views: RwLock<HashMap<FlowKey, ViewSnapshot>>,
    stopped: RwLock<Vec<StopRecord>>,
}

impl InMemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed snapshot, ordered by key.
    pub async fn views(&self) -> Vec<ViewSnapshot> {
        let mut views: Vec<_> = self.views.read().await.values().cloned().collect();
        views.sort_by(|a, b| a.key.cmp(&b.key));
        views
    }

    /// Every stop record, in the order they were written.
    pub async fn stops(&self) -> Vec<StopRecord> {
        self.stopped.read().await.clone()
    }
}

#[async_trait]
impl Timeline for InMemoryTimeline {
    async fn push_view(&self, snapshot: ViewSnapshot) -> Result<()> {
        let mut views = self.views.write().await;

        // A commit never moves a view backwards.
        if let Some(existing) = views.get(&snapshot.key) {
            if existing.checkpoint > snapshot.checkpoint {
                return Err(TimelineError::Rejected {
                    key: snapshot.key,
                    message: format!(
                        "checkpoint {:?} is behind committed {:?}",
                        snapshot.checkpoint, existing.checkpoint
                    ),
                });
            }
        }

        debug!(view = %snapshot.key, checkpoint = ?snapshot.checkpoint, "Committed view");
        views.insert(snapshot.key.clone(), snapshot);
        Ok(())
    }

    async fn push_stopped(&self, key: &FlowKey, point: &Point, error: &str) -> Result<()> {
        let mut stopped = self.stopped.write().await;

        if stopped.iter().any(|record| &record.key == key) {
            return Err(TimelineError::Rejected {
                key: key.clone(),
                message: "flow already stopped".to_string(),
            });
        }

        stopped.push(StopRecord {
            key: key.clone(),
            position: point.position,
            event_type: point.event_type.clone(),
            error: error.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn read_view(&self, key: &FlowKey) -> Result<Option<ViewSnapshot>> {
        Ok(self.views.read().await.get(key).cloned())
    }

    async fn read_stopped(&self, key: &FlowKey) -> Result<Option<StopRecord>> {
        let stopped = self.stopped.read().await;
        Ok(stopped.iter().find(|record| &record.key == key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::timeline::Position;

    fn snapshot(key: &FlowKey, checkpoint: u64) -> ViewSnapshot {
        ViewSnapshot {
            key: key.clone(),
            checkpoint: Some(Position(checkpoint)),
            state: serde_json::json!({ "total": checkpoint }),
        }
    }

    #[tokio::test]
    async fn test_push_view_overwrites_by_key() {
        let timeline = InMemoryTimeline::new();
        let key = FlowKey::instance("orders.detail", "7");

        timeline.push_view(snapshot(&key, 1)).await.unwrap();
        timeline.push_view(snapshot(&key, 4)).await.unwrap();

        let views = timeline.views().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].checkpoint, Some(Position(4)));
    }

    #[tokio::test]
    async fn test_push_view_rejects_older_checkpoint() {
        let timeline = InMemoryTimeline::new();
        let key = FlowKey::singleton("totals");

        assert_ok!(timeline.push_view(snapshot(&key, 5)).await);
        let error = assert_err!(timeline.push_view(snapshot(&key, 3)).await);

        assert!(matches!(error, TimelineError::Rejected { .. }));
        let current = timeline.read_view(&key).await.unwrap().unwrap();
        assert_eq!(current.checkpoint, Some(Position(5)));
    }

    #[tokio::test]
    async fn test_push_stopped_once_per_flow() {
        let timeline = InMemoryTimeline::new();
        let key = FlowKey::singleton("totals");
        let point = Point::new(3, "order_placed");

        assert_ok!(timeline.push_stopped(&key, &point, "boom").await);
        assert_err!(timeline.push_stopped(&key, &point, "boom").await);

        let record = timeline.read_stopped(&key).await.unwrap().unwrap();
        assert_eq!(record.position, Position(3));
        assert_eq!(record.event_type, "order_placed");
        assert_eq!(record.error, "boom");
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let timeline = InMemoryTimeline::new();
        let key = FlowKey::singleton("missing");

        assert!(timeline.read_view(&key).await.unwrap().is_none());
        assert!(timeline.read_stopped(&key).await.unwrap().is_none());
    }
}
