//! Views: flows whose state is materialized back onto the timeline.
//!
//! A view's state is periodically committed to the timeline and pushed to
//! subscribers through an exchange. `View` marks the flows that can be
//! materialized; `ViewScope` is the batching and failure handling that
//! drives a view inside a `FlowSession`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::flow::{Flow, FlowKey};
use crate::timeline::ViewSnapshot;

mod batch;
mod scope;

pub use batch::BatchTracker;
pub use scope::ViewScope;

/// A flow whose whole state is serializable.
///
/// The serialized value is the commit record written to the timeline and
/// the update pushed to subscribers. Resumed instances are deserialized
/// from their last commit.
pub trait View: Flow + Serialize + DeserializeOwned {}

impl<T> View for T where T: Flow + Serialize + DeserializeOwned {}

/// Serialize a view into its commit record.
pub fn snapshot_of<V: View>(key: &FlowKey, view: &V) -> serde_json::Result<ViewSnapshot> {
    Ok(ViewSnapshot {
        key: key.clone(),
        checkpoint: view.context().checkpoint,
        state: serde_json::to_value(view)?,
    })
}

/// Rebuild a view from its commit record.
pub fn restore<V: View>(snapshot: &ViewSnapshot) -> serde_json::Result<V> {
    serde_json::from_value(snapshot.state.clone())
}
