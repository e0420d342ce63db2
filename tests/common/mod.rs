#![allow(dead_code, unused_imports)]

//! Helpers shared by the integration tests.

pub use chainwork_test_utils::{init_tracing, with_timeout};

use chainwork::chain::{ChainId, ChainState, ChainSubmission};
use chainwork::constraints::{ConstraintSet, Environment};
use chainwork::engine::{CoreStep, EngineEvent, Reply};
use chainwork::exec::{WorkReport, WorkTarget};
use chainwork::jobs::{JobId, JobState};
use chainwork::status::{EntityId, EntityState, StatusDetail, StatusEvent, StatusSubscription};
use chainwork::types::NetworkClass;
use chainwork::work::{Data, Outcome};

pub fn job_in(id: JobId, state: JobState) -> (EntityId, EntityState) {
    (EntityId::Job(id), EntityState::Job(state))
}

pub fn chain_in(id: ChainId, state: ChainState) -> (EntityId, EntityState) {
    (EntityId::Chain(id), EntityState::Chain(state))
}

/// Receive events until one matches `pred`; panics if the stream closes.
pub async fn wait_for<F>(feed: &mut StatusSubscription, pred: F) -> StatusEvent
where
    F: Fn(&StatusEvent) -> bool,
{
    loop {
        match feed.recv().await {
            Some(event) if pred(&event) => return event,
            Some(_) => continue,
            None => panic!("status stream closed before the expected event"),
        }
    }
}

/// Wait for `id` to publish `state`.
pub async fn wait_for_state(
    feed: &mut StatusSubscription,
    id: impl Into<EntityId>,
    state: EntityState,
) -> StatusEvent {
    let id = id.into();
    wait_for(feed, |e| e.entity == id && e.state == state).await
}

pub fn network(network: NetworkClass) -> ConstraintSet {
    ConstraintSet {
        network,
        ..ConstraintSet::default()
    }
}

pub fn environment(network: NetworkClass) -> Environment {
    Environment {
        network,
        ..Environment::default()
    }
}

/// The id in a `submit_job` reply; panics on anything else.
pub fn accepted_job(step: &CoreStep) -> JobId {
    match &step.reply {
        Some(Reply::Job(Ok(id))) => *id,
        other => panic!("expected an accepted job, got {other:?}"),
    }
}

/// The submission in a `submit_chain` reply; panics on anything else.
pub fn chain_submission(step: &CoreStep) -> ChainSubmission {
    match &step.reply {
        Some(Reply::Chain(Ok(submission))) => *submission,
        other => panic!("expected an accepted chain, got {other:?}"),
    }
}

pub fn cancelled_count(step: &CoreStep) -> usize {
    match &step.reply {
        Some(Reply::Cancelled(count)) => *count,
        other => panic!("expected a cancel reply, got {other:?}"),
    }
}

/// `(entity, state)` of every transition in `step`, in publish order.
pub fn transitions(step: &CoreStep) -> Vec<(EntityId, EntityState)> {
    step.updates.iter().map(|u| (u.entity, u.state)).collect()
}

pub fn details(step: &CoreStep) -> Vec<StatusDetail> {
    step.updates.iter().map(|u| u.detail.clone()).collect()
}

pub fn dispatched_targets(step: &CoreStep) -> Vec<WorkTarget> {
    step.dispatched().map(|o| o.target).collect()
}

/// A `WorkFinished` event as the executor would send it.
pub fn finished(target: WorkTarget, outcome: Outcome, input: Data) -> EngineEvent {
    EngineEvent::WorkFinished {
        target,
        report: WorkReport::new(outcome, input),
    }
}

/// Same as [`finished`], for a unit that saw its stop signal.
pub fn finished_after_stop(target: WorkTarget, outcome: Outcome, input: Data) -> EngineEvent {
    EngineEvent::WorkFinished {
        target,
        report: WorkReport {
            stopped: true,
            ..WorkReport::new(outcome, input)
        },
    }
}
