//! Test utilities.
//!
//! A simple counting view and a shared call log so tests can assert the
//! order in which a view touched the timeline and the exchange.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::flow::{ApplyError, Flow, FlowContext, FlowKey};
use crate::timeline::{Point, Position};

/// A call made against a mock collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PushView { key: FlowKey, checkpoint: Option<Position> },
    PushStopped { key: FlowKey, position: Position },
    PushUpdate { key: FlowKey },
}

/// Ordered record of calls, shareable between mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<RwLock<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, call: Call) {
        self.calls.write().await.push(call);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.read().await.clone()
    }
}

/// View that records applied positions and sums `amount` payloads.
///
/// Event types:
/// - `fail`: rejected
/// - `complete`: applied, then marks the view done
/// - anything else: applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterView {
    pub context: FlowContext,
    pub applied: Vec<u64>,
    pub total: i64,
}

#[async_trait]
impl Flow for CounterView {
    fn create(_key: &FlowKey) -> Self {
        Self::default()
    }

    fn context(&self) -> &FlowContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    async fn when(&mut self, point: &Point) -> Result<(), ApplyError> {
        match point.event_type.as_str() {
            "fail" => {
                return Err(ApplyError::Rejected(format!(
                    "cannot apply point {}",
                    point.position
                )))
            }
            "complete" => self.context.set_done(),
            _ => {}
        }

        self.total += point
            .payload
            .get("amount")
            .and_then(|amount| amount.as_i64())
            .unwrap_or(1);
        self.applied.push(point.position.value());
        Ok(())
    }
}

/// Build a shared point.
pub fn make_point(position: u64, event_type: &str) -> Arc<Point> {
    Arc::new(Point::new(position, event_type))
}
