//! Flow sessions.
//!
//! A flow is one sequential consumer of timeline points. This module holds
//! the generic machinery shared by every kind of flow:
//! - `Flow`: the logic that folds points into a flow's state
//! - `FlowKey`: identity of a flow instance
//! - `FlowContext`: progress flags carried inside the flow's state
//! - `FlowSession`: delivers points to a `FlowScope` and tracks completion
//!
//! The scope is the capability a specific kind of flow implements (views
//! implement it in `crate::view::ViewScope`).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::timeline::{Point, Position, TimelineError};

mod session;

pub use session::{FlowOutcome, FlowScope, FlowSession, FlowState};

/// Errors raised by a flow while applying a point.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("Point rejected: {0}")]
    Rejected(String),

    #[error("Unexpected event '{0}'")]
    UnexpectedEvent(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Logic of a flow: folds timeline points into the flow's own state.
#[async_trait]
pub trait Flow: Send + Sync + 'static {
    /// Create the initial state for a new instance.
    fn create(key: &FlowKey) -> Self
    where
        Self: Sized;

    fn context(&self) -> &FlowContext;

    fn context_mut(&mut self) -> &mut FlowContext;

    /// Apply one point.
    ///
    /// Points arrive in position order. Returning an error stops the
    /// instance at this point.
    async fn when(&mut self, point: &Point) -> Result<(), ApplyError>;
}

/// Identity of a flow instance: its type plus an optional instance id.
///
/// Singleton flows (one instance per type) have no id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub flow_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FlowKey {
    /// Key for a singleton flow.
    pub fn singleton(flow_type: impl Into<String>) -> Self {
        Self {
            flow_type: flow_type.into(),
            id: None,
        }
    }

    /// Key for one instance of a multi-instance flow.
    pub fn instance(flow_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            flow_type: flow_type.into(),
            id: Some(id.into()),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.flow_type, id),
            None => write!(f, "{}", self.flow_type),
        }
    }
}

/// Progress flags a flow carries inside its own state.
///
/// Serialized with the flow so a resumed instance knows where it left off
/// and whether it had already stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowContext {
    /// Set by the flow once it needs no further points.
    pub done: bool,
    /// Position of the point whose application stopped the flow.
    pub error_position: Option<Position>,
    /// Position of the last point applied.
    pub checkpoint: Option<Position>,
}

impl FlowContext {
    pub fn set_done(&mut self) {
        self.done = true;
    }

    pub fn set_error(&mut self, position: Position) {
        self.error_position = Some(position);
    }

    pub fn has_error(&self) -> bool {
        self.error_position.is_some()
    }

    /// Whether the point at `position` was already applied.
    pub fn has_applied(&self, position: Position) -> bool {
        self.checkpoint.is_some_and(|checkpoint| position <= checkpoint)
    }
}

/// Errors that end a flow's task.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The flow stopped because a point could not be applied.
    ///
    /// The stop was recorded on the timeline.
    #[error("Flow '{key}' stopped at {position}: {source}")]
    Stopped {
        key: FlowKey,
        position: Position,
        #[source]
        source: ApplyError,
    },

    /// The flow could not commit its state to the timeline.
    #[error("Flow '{key}' failed to push to timeline: {source}")]
    Commit {
        key: FlowKey,
        #[source]
        source: TimelineError,
    },

    /// The flow stopped and the stop itself could not be recorded.
    #[error(
        "Flow '{key}' stopped at {position}: {error}; failed to record stop: {push_error}"
    )]
    StopNotRecorded {
        key: FlowKey,
        position: Position,
        error: ApplyError,
        push_error: TimelineError,
    },
}

impl FlowError {
    pub fn key(&self) -> &FlowKey {
        match self {
            Self::Stopped { key, .. }
            | Self::Commit { key, .. }
            | Self::StopNotRecorded { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_singleton() {
        assert_eq!(FlowKey::singleton("orders.summary").to_string(), "orders.summary");
    }

    #[test]
    fn test_key_display_instance() {
        assert_eq!(
            FlowKey::instance("orders.detail", "42").to_string(),
            "orders.detail/42"
        );
    }

    #[test]
    fn test_context_has_applied() {
        let mut context = FlowContext::default();
        assert!(!context.has_applied(Position(1)));

        context.checkpoint = Some(Position(5));
        assert!(context.has_applied(Position(5)));
        assert!(context.has_applied(Position(3)));
        assert!(!context.has_applied(Position(6)));
    }

    #[test]
    fn test_context_set_error() {
        let mut context = FlowContext::default();
        context.set_error(Position(9));
        assert!(context.has_error());
        assert_eq!(context.error_position, Some(Position(9)));
    }

    #[test]
    fn test_stop_not_recorded_reports_both_errors() {
        let error = FlowError::StopNotRecorded {
            key: FlowKey::singleton("totals"),
            position: Position(4),
            error: ApplyError::Rejected("negative quantity".to_string()),
            push_error: TimelineError::Unavailable("disk full".to_string()),
        };

        let message = error.to_string();
        assert!(message.contains("negative quantity"));
        assert!(message.contains("disk full"));
        assert_eq!(error.key(), &FlowKey::singleton("totals"));
    }
}
