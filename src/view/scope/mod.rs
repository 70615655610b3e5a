//! Batching and failure handling for a view on the timeline.
//!
//! A view commits its state every `batch_size` applied points, and again
//! whenever it runs out of points to apply. Failures are handled by kind:
//! - apply failure: commit the pending batch, then record a stop
//! - commit failure: end the task at once, with no further writes
//! - update failure: log and carry on

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{snapshot_of, BatchTracker, View};
use crate::exchange::{ExchangeError, ViewExchange, ViewUpdate};
use crate::flow::{ApplyError, FlowError, FlowScope, FlowState};
use crate::timeline::{Point, Timeline, TimelineError};

/// The scope of a view's activity on the timeline.
pub struct ViewScope {
    timeline: Arc<dyn Timeline>,
    exchange: Arc<dyn ViewExchange>,
    batch: BatchTracker,
}

impl ViewScope {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        exchange: Arc<dyn ViewExchange>,
        batch_size: usize,
    ) -> Self {
        Self {
            timeline,
            exchange,
            batch: BatchTracker::new(batch_size),
        }
    }

    /// Points applied since the last commit.
    pub fn batch(&self) -> &BatchTracker {
        &self.batch
    }

    async fn push_batch_point<V: View>(&mut self, state: &mut FlowState<V>, point: Arc<Point>) {
        match state.call_when().await {
            Ok(()) => {
                if self.batch.advance() {
                    self.push_batch(state).await;
                }
            }
            Err(e) => {
                if self.batch.has_pending() {
                    self.push_batch(state).await;
                }

                // A failed commit already ended the task; the apply error goes with it.
                if state.not_completed() {
                    self.push_stopped(state, &point, e).await;
                }
            }
        }
    }

    async fn push_batch<V: View>(&mut self, state: &mut FlowState<V>) {
        let count = self.batch.count();

        let result = match state.flow() {
            Some(view) => match snapshot_of(state.key(), view) {
                Ok(snapshot) => self.timeline.push_view(snapshot).await,
                Err(e) => Err(TimelineError::Serialization(e)),
            },
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                if count > 1 {
                    debug!(view = %state.key(), batch = count, "Pushed to timeline after batch");
                }
                self.batch.reset();
            }
            Err(e) => {
                error!(
                    view = %state.key(),
                    batch = count,
                    error = %e,
                    "Failed to push to timeline after batch"
                );

                let key = state.key().clone();
                state.complete(Err(FlowError::Commit { key, source: e }));
            }
        }
    }

    async fn push_stopped<V: View>(
        &mut self,
        state: &mut FlowState<V>,
        point: &Point,
        error: ApplyError,
    ) {
        let key = state.key().clone();
        error!(view = %key, position = %point.position, error = %error, "View stopped");

        // Recorded locally first so the view reflects the stop even if the
        // timeline write below fails.
        if let Some(view) = state.flow_mut() {
            view.context_mut().set_error(point.position);
        }

        let message = error.to_string();
        match self.timeline.push_stopped(&key, point, &message).await {
            Ok(()) => state.complete(Err(FlowError::Stopped {
                key,
                position: point.position,
                source: error,
            })),
            Err(push_error) => {
                error!(
                    view = %key,
                    position = %point.position,
                    error = %push_error,
                    "Failed to push stop to timeline"
                );

                state.complete(Err(FlowError::StopNotRecorded {
                    key,
                    position: point.position,
                    error,
                    push_error,
                }));
            }
        }
    }

    async fn complete_batch<V: View>(&mut self, state: &mut FlowState<V>) {
        if state.not_completed() && self.batch.has_pending() {
            self.push_batch(state).await;
        }

        if state.not_completed() && !state.resuming() {
            self.push_update(state).await;
        }

        if state.not_completed() && state.flow().is_some_and(|view| view.context().done) {
            state.complete(Ok(()));
        }
    }

    async fn push_update<V: View>(&self, state: &FlowState<V>) {
        let Some(view) = state.flow() else {
            return;
        };

        let result = match serde_json::to_value(view) {
            Ok(value) => {
                let update = ViewUpdate {
                    key: state.key().clone(),
                    checkpoint: view.context().checkpoint,
                    state: value,
                };
                self.exchange.push_update(update).await
            }
            Err(e) => Err(ExchangeError::Serialization(e)),
        };

        if let Err(e) = result {
            error!(view = %state.key(), error = %e, "Failed to push update");
        }
    }
}

#[async_trait]
impl<V: View> FlowScope<V> for ViewScope {
    async fn push_point(&mut self, state: &mut FlowState<V>, point: Arc<Point>) {
        if state.not_completed() {
            self.push_batch_point(state, point).await;
        }
    }

    async fn on_waiting_for_points(&mut self, state: &mut FlowState<V>) {
        self.complete_batch(state).await;
    }
}
