//! Point delivery for one flow instance.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use super::{ApplyError, Flow, FlowError, FlowKey};
use crate::timeline::{Point, Position};

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The flow reported itself done and its task completed.
    Done,
    /// The point source closed while the flow was still live.
    Detached,
}

/// Capability a kind of flow implements to take part in a session.
///
/// The session owns the instance state and calls into the scope; the scope
/// decides what happens around each point and ends the task through
/// `FlowState::complete`.
#[async_trait]
pub trait FlowScope<F: Flow>: Send {
    /// A new point is ready. `state.point()` holds it as well.
    async fn push_point(&mut self, state: &mut FlowState<F>, point: Arc<Point>);

    /// No point is ready right now.
    async fn on_waiting_for_points(&mut self, state: &mut FlowState<F>);
}

/// Per-instance state owned by a session.
pub struct FlowState<F> {
    key: FlowKey,
    flow: Option<F>,
    point: Option<Arc<Point>>,
    resume_until: Option<Position>,
    outcome: Option<Result<(), FlowError>>,
}

impl<F: Flow> FlowState<F> {
    pub fn new(key: FlowKey, flow: Option<F>) -> Self {
        Self {
            key,
            flow,
            point: None,
            resume_until: None,
            outcome: None,
        }
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    /// The flow's state. `None` until the first point is applied.
    pub fn flow(&self) -> Option<&F> {
        self.flow.as_ref()
    }

    pub fn flow_mut(&mut self) -> Option<&mut F> {
        self.flow.as_mut()
    }

    /// The point currently being delivered.
    pub fn point(&self) -> Option<&Arc<Point>> {
        self.point.as_ref()
    }

    /// Whether the session is replaying points the flow had already seen
    /// before it was resumed.
    pub fn resuming(&self) -> bool {
        match (self.resume_until, self.point.as_ref()) {
            (Some(until), Some(point)) => point.position < until,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn not_completed(&self) -> bool {
        self.outcome.is_none()
    }

    /// End the flow's task. Only the first call takes effect.
    pub fn complete(&mut self, result: Result<(), FlowError>) {
        if self.outcome.is_some() {
            warn!(flow = %self.key, "Flow already completed, ignoring");
            return;
        }

        match &result {
            Ok(()) => info!(flow = %self.key, "Flow completed"),
            Err(e) => debug!(flow = %self.key, error = %e, "Flow completed with error"),
        }

        self.outcome = Some(result);
    }

    /// Apply the current point, creating the flow on first use.
    pub async fn call_when(&mut self) -> Result<(), ApplyError> {
        let Some(point) = self.point.clone() else {
            return Ok(());
        };

        let flow = self.flow.get_or_insert_with(|| F::create(&self.key));
        flow.when(&point).await?;
        flow.context_mut().checkpoint = Some(point.position);

        Ok(())
    }

    fn checkpoint(&self) -> Option<Position> {
        self.flow.as_ref().and_then(|flow| flow.context().checkpoint)
    }
}

/// Delivers points to one flow instance, one at a time.
///
/// Sessions are never shared: the task running a session is the only
/// writer of its flow, scope and completion state.
pub struct FlowSession<F, S> {
    state: FlowState<F>,
    scope: S,
}

impl<F, S> FlowSession<F, S>
where
    F: Flow,
    S: FlowScope<F>,
{
    pub fn new(key: FlowKey, flow: Option<F>, scope: S) -> Self {
        Self {
            state: FlowState::new(key, flow),
            scope,
        }
    }

    /// Treat points before `position` as a replay of history.
    ///
    /// Has no effect if the flow has already applied `position`.
    pub fn resuming_until(mut self, position: Position) -> Self {
        let replayed = self
            .state
            .checkpoint()
            .is_some_and(|checkpoint| position <= checkpoint);

        if !replayed {
            self.state.resume_until = Some(position);
        }
        self
    }

    pub fn state(&self) -> &FlowState<F> {
        &self.state
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Deliver one point.
    ///
    /// Points at or before the flow's checkpoint were already applied and
    /// are skipped.
    pub async fn push(&mut self, point: Arc<Point>) {
        if !self.state.not_completed() {
            debug!(
                flow = %self.state.key,
                position = %point.position,
                "Flow completed, dropping point"
            );
            return;
        }

        if let Some(checkpoint) = self.state.checkpoint() {
            if point.position <= checkpoint {
                debug!(
                    flow = %self.state.key,
                    position = %point.position,
                    checkpoint = %checkpoint,
                    "Skipping point already applied"
                );
                return;
            }
        }

        self.state.point = Some(point.clone());
        self.scope.push_point(&mut self.state, point).await;
    }

    /// Signal that no point is ready.
    pub async fn wait(&mut self) {
        if self.state.not_completed() {
            self.scope.on_waiting_for_points(&mut self.state).await;
        }
    }

    /// Consume points until the flow completes or the source closes.
    ///
    /// Whenever the source has nothing ready the scope is told the flow is
    /// waiting, before blocking on the next point.
    pub async fn run(
        mut self,
        mut points: mpsc::Receiver<Arc<Point>>,
    ) -> Result<FlowOutcome, FlowError> {
        while self.state.not_completed() {
            let point = match points.try_recv() {
                Ok(point) => point,
                Err(TryRecvError::Empty) => {
                    self.wait().await;
                    if !self.state.not_completed() {
                        break;
                    }
                    match points.recv().await {
                        Some(point) => point,
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    self.wait().await;
                    break;
                }
            };

            self.push(point).await;
        }

        self.finish()
    }

    /// Consume the session and report how it ended.
    pub fn finish(mut self) -> Result<FlowOutcome, FlowError> {
        match self.state.outcome.take() {
            Some(Ok(())) => Ok(FlowOutcome::Done),
            Some(Err(e)) => Err(e),
            None => Ok(FlowOutcome::Detached),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::CounterView;

    /// Scope that applies every point and completes once the flow is done.
    #[derive(Default)]
    struct ApplyingScope;

    #[async_trait]
    impl FlowScope<CounterView> for ApplyingScope {
        async fn push_point(&mut self, state: &mut FlowState<CounterView>, point: Arc<Point>) {
            if let Err(e) = state.call_when().await {
                let key = state.key().clone();
                state.complete(Err(FlowError::Stopped {
                    key,
                    position: point.position,
                    source: e,
                }));
            }
        }

        async fn on_waiting_for_points(&mut self, state: &mut FlowState<CounterView>) {
            if state.flow().is_some_and(|flow| flow.context.done) {
                state.complete(Ok(()));
            }
        }
    }

    fn point(position: u64, event_type: &str) -> Arc<Point> {
        Arc::new(Point::new(position, event_type))
    }

    fn session() -> FlowSession<CounterView, ApplyingScope> {
        FlowSession::new(FlowKey::singleton("counter"), None, ApplyingScope::default())
    }

    #[tokio::test]
    async fn test_push_creates_flow_and_advances_checkpoint() {
        let mut session = session();

        session.push(point(1, "added")).await;

        let flow = session.state().flow().unwrap();
        assert_eq!(flow.applied, vec![1]);
        assert_eq!(flow.context.checkpoint, Some(Position(1)));
    }

    #[tokio::test]
    async fn test_push_skips_points_already_applied() {
        let mut session = session();

        session.push(point(1, "added")).await;
        session.push(point(2, "added")).await;
        session.push(point(2, "added")).await;
        session.push(point(1, "added")).await;

        assert_eq!(session.state().flow().unwrap().applied, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_push_after_completion_is_dropped() {
        let mut session = session();

        session.push(point(1, "fail")).await;
        session.push(point(2, "added")).await;

        assert!(!session.state().not_completed());
        assert!(session.state().flow().unwrap().applied.is_empty());
    }

    #[tokio::test]
    async fn test_complete_keeps_first_result() {
        let mut state: FlowState<CounterView> =
            FlowState::new(FlowKey::singleton("counter"), None);

        state.complete(Ok(()));
        state.complete(Err(FlowError::Stopped {
            key: FlowKey::singleton("counter"),
            position: Position(1),
            source: ApplyError::Rejected("late".to_string()),
        }));

        assert!(matches!(state.outcome, Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_resuming_until_target_position() {
        let mut session = session().resuming_until(Position(3));
        assert!(session.state().resuming());

        session.push(point(2, "added")).await;
        assert!(session.state().resuming());

        session.push(point(3, "added")).await;
        assert!(!session.state().resuming());
    }

    #[tokio::test]
    async fn test_resuming_ignored_when_target_already_applied() {
        let mut view = CounterView::create(&FlowKey::singleton("counter"));
        view.context.checkpoint = Some(Position(10));

        let session = FlowSession::new(
            FlowKey::singleton("counter"),
            Some(view),
            ApplyingScope::default(),
        )
        .resuming_until(Position(5));

        assert!(!session.state().resuming());
    }

    #[tokio::test]
    async fn test_run_idles_between_points_and_completes_when_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(point(1, "added")).await.unwrap();
        tx.send(point(2, "complete")).await.unwrap();

        let outcome = session().run(rx).await.unwrap();

        assert_eq!(outcome, FlowOutcome::Done);
    }

    #[tokio::test]
    async fn test_run_detaches_when_source_closes() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(point(1, "added")).await.unwrap();
        drop(tx);

        let outcome = session().run(rx).await.unwrap();

        assert_eq!(outcome, FlowOutcome::Detached);
    }

    #[tokio::test]
    async fn test_run_returns_flow_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(point(1, "added")).await.unwrap();
        tx.send(point(2, "fail")).await.unwrap();

        let result = session().run(rx).await;

        match result {
            Err(FlowError::Stopped { position, .. }) => assert_eq!(position, Position(2)),
            other => panic!("Expected Stopped, got {:?}", other),
        }
    }
}
