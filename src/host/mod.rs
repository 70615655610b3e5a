//! View host.
//!
//! Routes timeline points to view instances. Each instance runs its own
//! `FlowSession` on a dedicated tokio task, fed through a bounded inbox:
//! the task is the only writer of its view, batch and context, and the host
//! only ever holds the inbox sender.
//!
//! Instances are activated on first delivery. Activation restores the view
//! from its last commit and refuses views that already stopped or finished.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Config, ViewsConfig};
use crate::exchange::ViewExchange;
use crate::flow::{FlowError, FlowKey, FlowOutcome, FlowSession};
use crate::timeline::{Point, Position, Timeline, TimelineError};
use crate::view::{restore, View, ViewScope};

/// Errors raised while routing points to view instances.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Failed to restore view '{key}': {source}")]
    Restore {
        key: FlowKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("View '{key}' stopped at {position}")]
    Stopped { key: FlowKey, position: Position },

    #[error("View '{key}' has finished")]
    Finished { key: FlowKey },

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("View task failed: {0}")]
    Join(#[from] JoinError),
}

/// Final result of one view instance.
pub type InstanceResult = (FlowKey, Result<FlowOutcome, HostError>);

struct Instance {
    inbox: mpsc::Sender<Arc<Point>>,
    task: JoinHandle<Result<FlowOutcome, FlowError>>,
}

/// Runs view instances of type `V`, one task per key.
pub struct ViewHost<V> {
    timeline: Arc<dyn Timeline>,
    exchange: Arc<dyn ViewExchange>,
    views: ViewsConfig,
    inbox_capacity: usize,
    instances: HashMap<FlowKey, Instance>,
    retired: Vec<InstanceResult>,
    _view: PhantomData<fn() -> V>,
}

impl<V: View> ViewHost<V> {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        exchange: Arc<dyn ViewExchange>,
        config: &Config,
    ) -> Self {
        Self {
            timeline,
            exchange,
            views: config.views.clone(),
            inbox_capacity: config.host.inbox_capacity.max(1),
            instances: HashMap::new(),
            retired: Vec::new(),
            _view: PhantomData,
        }
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.instances.contains_key(key)
    }

    /// Deliver a point to the instance for `key`, activating it if needed.
    pub async fn deliver(&mut self, key: FlowKey, point: Arc<Point>) -> Result<(), HostError> {
        if !self.instances.contains_key(&key) {
            self.activate(&key, None).await?;
        }

        let sent = match self.instances.get(&key) {
            Some(instance) => instance.inbox.send(point).await.is_ok(),
            None => false,
        };

        if !sent {
            // The task dropped its inbox: the view completed.
            self.retire(&key).await;
            return Err(HostError::Finished { key });
        }
        Ok(())
    }

    /// Activate an instance that replays history up to `until`.
    ///
    /// Updates are not pushed to subscribers until the replay reaches
    /// `until`. Does nothing if the instance is already live.
    pub async fn resume(&mut self, key: FlowKey, until: Position) -> Result<(), HostError> {
        if self.instances.contains_key(&key) {
            return Ok(());
        }
        self.activate(&key, Some(until)).await
    }

    /// Collect the results of instances whose task has ended.
    pub async fn retire_finished(&mut self) -> Vec<InstanceResult> {
        let finished: Vec<FlowKey> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.task.is_finished())
            .map(|(key, _)| key.clone())
            .collect();

        for key in finished {
            self.retire(&key).await;
        }

        std::mem::take(&mut self.retired)
    }

    /// Close every inbox and wait for all instances to drain.
    ///
    /// Live instances commit any pending batch before they detach.
    pub async fn shutdown(mut self) -> Vec<InstanceResult> {
        let instances: Vec<_> = self.instances.drain().collect();
        let keys: Vec<FlowKey> = instances.iter().map(|(key, _)| key.clone()).collect();
        let tasks = instances.into_iter().map(|(_, instance)| {
            drop(instance.inbox);
            instance.task
        });

        let outcomes = futures::future::join_all(tasks).await;

        let mut results = std::mem::take(&mut self.retired);
        for (key, outcome) in keys.into_iter().zip(outcomes) {
            results.push((key, flatten(outcome)));
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        info!(instances = results.len(), "View host shut down");
        results
    }

    async fn activate(
        &mut self,
        key: &FlowKey,
        resume_until: Option<Position>,
    ) -> Result<(), HostError> {
        if let Some(stop) = self.timeline.read_stopped(key).await? {
            warn!(view = %key, position = %stop.position, "View stopped, not activating");
            return Err(HostError::Stopped {
                key: key.clone(),
                position: stop.position,
            });
        }

        let view = match self.timeline.read_view(key).await? {
            Some(snapshot) => Some(restore::<V>(&snapshot).map_err(|source| {
                error!(view = %key, error = %source, "Failed to restore view");
                HostError::Restore {
                    key: key.clone(),
                    source,
                }
            })?),
            None => None,
        };

        if let Some(view) = &view {
            let context = view.context();
            if let Some(position) = context.error_position {
                return Err(HostError::Stopped {
                    key: key.clone(),
                    position,
                });
            }
            if context.done {
                return Err(HostError::Finished { key: key.clone() });
            }
        }

        let batch_size = self.views.batch_size(&key.flow_type);
        let checkpoint = view.as_ref().and_then(|view| view.context().checkpoint);
        let scope = ViewScope::new(self.timeline.clone(), self.exchange.clone(), batch_size);

        let mut session = FlowSession::new(key.clone(), view, scope);
        if let Some(until) = resume_until {
            session = session.resuming_until(until);
        }

        let (inbox, points) = mpsc::channel(self.inbox_capacity);
        let span = info_span!("view", view = %key);
        let task = tokio::spawn(session.run(points).instrument(span));

        info!(
            view = %key,
            batch_size,
            checkpoint = ?checkpoint,
            resuming = resume_until.is_some(),
            "Activated view"
        );

        self.instances.insert(key.clone(), Instance { inbox, task });
        Ok(())
    }

    async fn retire(&mut self, key: &FlowKey) {
        let Some(instance) = self.instances.remove(key) else {
            return;
        };
        drop(instance.inbox);

        let result = flatten(instance.task.await);
        match &result {
            Ok(outcome) => info!(view = %key, outcome = ?outcome, "Retired view"),
            Err(e) => warn!(view = %key, error = %e, "Retired failed view"),
        }
        self.retired.push((key.clone(), result));
    }
}

fn flatten(
    joined: Result<Result<FlowOutcome, FlowError>, JoinError>,
) -> Result<FlowOutcome, HostError> {
    Ok(joined??)
}
