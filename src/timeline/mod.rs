//! Timeline interface.
//!
//! The timeline is the ordered log every flow instance consumes. This module
//! defines the records views exchange with it:
//! - `Point`: one ordered event delivered to a flow
//! - `ViewSnapshot`: the committed state of a view (commit record)
//! - `StopRecord`: a terminal failure marker for a flow
//!
//! and the `Timeline` trait through which views commit and stop.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::FlowKey;

pub mod memory;
pub mod mock;

pub use memory::InMemoryTimeline;
pub use mock::MockTimeline;

/// Result type for timeline operations.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Errors that can occur while writing to or reading from the timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Timeline unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected for '{key}': {message}")]
    Rejected { key: FlowKey, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Position of a point on the timeline.
///
/// Positions increase strictly; a flow consumes points in position order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(pub u64);

impl Position {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One ordered event on the timeline.
///
/// Points are immutable once written; flows receive them as `Arc<Point>` so
/// every instance routed the same point shares one allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Position,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl Point {
    pub fn new(position: impl Into<Position>, event_type: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            event_type: event_type.into(),
            payload: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Committed state of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub key: FlowKey,
    /// Position of the last point folded into `state`.
    pub checkpoint: Option<Position>,
    pub state: serde_json::Value,
}

/// Terminal failure of a flow at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub key: FlowKey,
    pub position: Position,
    pub event_type: String,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Interface for the timeline as seen by views.
///
/// Implementations must be safe for concurrent use: every flow instance in
/// the process shares one timeline.
///
/// Implementations:
/// - `InMemoryTimeline`: process-local storage
/// - `MockTimeline`: call recorder with failure injection for tests
#[async_trait]
pub trait Timeline: Send + Sync {
    /// Commit the current state of a view.
    ///
    /// Replaces any snapshot previously committed for the same key.
    async fn push_view(&self, snapshot: ViewSnapshot) -> Result<()>;

    /// Record that a flow stopped because `point` could not be applied.
    async fn push_stopped(&self, key: &FlowKey, point: &Point, error: &str) -> Result<()>;

    /// Latest committed snapshot for a view, if any.
    async fn read_view(&self, key: &FlowKey) -> Result<Option<ViewSnapshot>>;

    /// Stop record for a flow, if it has stopped.
    async fn read_stopped(&self, key: &FlowKey) -> Result<Option<StopRecord>>;
}
