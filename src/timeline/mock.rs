//! Mock timeline for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Point, Result, StopRecord, Timeline, TimelineError, ViewSnapshot};
use crate::flow::FlowKey;
use crate::test_utils::{Call, CallLog};

/// Mock timeline that records every write.
#[derive(Default)]
pub struct MockTimeline {
    views: RwLock<Vec<ViewSnapshot>>,
    stopped: RwLock<Vec<StopRecord>>,
    fail_on_push_view: RwLock<bool>,
    fail_on_push_stopped: RwLock<bool>,
    log: Option<CallLog>,
}

impl MockTimeline {
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

    pub async fn set_fail_on_push_view(&self, fail: bool) {
        *self.fail_on_push_view.write().await = fail;
    }

    pub async fn set_fail_on_push_stopped(&self, fail: bool) {
        *self.fail_on_push_stopped.write().await = fail;
    }

    /// Successfully committed snapshots, oldest first.
    pub async fn pushed_views(&self) -> Vec<ViewSnapshot> {
        self.views.read().await.clone()
    }

    /// Successfully recorded stops, oldest first.
    pub async fn pushed_stops(&self) -> Vec<StopRecord> {
        self.stopped.read().await.clone()
    }

    async fn record(&self, call: Call) {
        if let Some(log) = &self.log {
            log.record(call).await;
        }
    }
}

#[async_trait]
impl Timeline for MockTimeline {
    async fn push_view(&self, snapshot: ViewSnapshot) -> Result<()> {
        self.record(Call::PushView {
            key: snapshot.key.clone(),
            checkpoint: snapshot.checkpoint,
        })
        .await;

        if *self.fail_on_push_view.read().await {
            return Err(TimelineError::Unavailable(
                "Mock push_view failure".to_string(),
            ));
        }
        self.views.write().await.push(snapshot);
        Ok(())
    }

    async fn push_stopped(&self, key: &FlowKey, point: &Point, error: &str) -> Result<()> {
        self.record(Call::PushStopped {
            key: key.clone(),
            position: point.position,
        })
        .await;

        if *self.fail_on_push_stopped.read().await {
            return Err(TimelineError::Unavailable(
                "Mock push_stopped failure".to_string(),
            ));
        }
        self.stopped.write().await.push(StopRecord {
            key: key.clone(),
            position: point.position,
            event_type: point.event_type.clone(),
            error: error.to_string(),
            recorded_at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn read_view(&self, key: &FlowKey) -> Result<Option<ViewSnapshot>> {
        let views = self.views.read().await;
        Ok(views.iter().rev().find(|s| &s.key == key).cloned())
    }

    async fn read_stopped(&self, key: &FlowKey) -> Result<Option<StopRecord>> {
        let stopped = self.stopped.read().await;
        Ok(stopped.iter().find(|s| &s.key == key).cloned())
    }
}
