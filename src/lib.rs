//! viewflow - materialized views over an ordered timeline
//!
//! Each view instance consumes timeline points one at a time, folds them
//! into its state, and periodically commits that state back to the timeline.
//! This crate decides when to commit, what to do when applying or committing
//! fails, and keeps subscribers informed without letting that path affect
//! the view's outcome.

pub mod config;
pub mod exchange;
pub mod flow;
pub mod host;
pub mod test_utils;
pub mod timeline;
pub mod utils;
pub mod view;

pub use flow::{ApplyError, Flow, FlowContext, FlowError, FlowKey, FlowOutcome};
pub use host::{HostError, ViewHost};
pub use timeline::{Point, Position, Timeline};
pub use view::{View, ViewScope};
