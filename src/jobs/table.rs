// src/jobs/table.rs

//! Job records and the constraint wait set.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::constraints::{evaluate, satisfied, ConstraintSet, EnvironmentSnapshot, Verdict};
use crate::errors::{ChainworkError, Result};
use crate::exec::{WorkOrder, WorkReport, WorkTarget};
use crate::status::{EntityId, EntityState, StatusDetail, StatusUpdate};
use crate::work::{Data, Outcome, WorkUnit};

use super::{JobId, JobRequest, JobState};

/// Everything the engine knows about one job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    id: JobId,
    unit: WorkUnit,
    /// `None` while the executor owns the payload.
    payload: Option<Data>,
    constraints: ConstraintSet,
    tags: BTreeSet<String>,
    submitted_at: Instant,
    state: JobState,
    /// The environment stopped satisfying the constraints mid-run.
    halt_requested: bool,
    finished_at: Option<Instant>,
}

impl JobRecord {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn is_halt_requested(&self) -> bool {
        self.halt_requested
    }

    fn status_update(&self, detail: StatusDetail) -> StatusUpdate {
        StatusUpdate {
            entity: EntityId::Job(self.id),
            name: None,
            tags: self.tags.clone(),
            state: EntityState::Job(self.state),
            detail,
        }
    }
}

/// Owns every job from submission until eviction.
///
/// `waiting` holds exactly the ids of `Pending` jobs.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<JobId, JobRecord>,
    waiting: BTreeSet<JobId>,
    next_id: u64,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new job in the wait set.
    pub fn admit(&mut self, request: JobRequest, now: Instant) -> Result<(JobId, StatusUpdate)> {
        if !request.constraints.has_active_constraint() {
            debug!(unit = %request.unit.name(), "rejecting job without an active constraint");
            return Err(ChainworkError::InvalidConstraints);
        }

        self.next_id += 1;
        let id = JobId(self.next_id);

        let JobRequest {
            unit,
            payload,
            constraints,
            mut tags,
        } = request;
        tags.extend(unit.tags().iter().cloned());

        info!(job = %id, unit = %unit.name(), ?constraints, "job accepted");

        let record = JobRecord {
            id,
            unit,
            payload: Some(payload),
            constraints,
            tags,
            submitted_at: now,
            state: JobState::Pending,
            halt_requested: false,
            finished_at: None,
        };
        let update = record.status_update(StatusDetail::None);

        self.jobs.insert(id, record);
        self.waiting.insert(id);
        Ok((id, update))
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.jobs.get(&id)
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.jobs.get(&id).map(|r| r.state)
    }

    /// Jobs in the wait set whose constraints are satisfied by `snapshot`,
    /// in submission order.
    pub fn ready(&self, snapshot: &EnvironmentSnapshot) -> Vec<(JobId, Verdict)> {
        self.waiting
            .iter()
            .filter_map(|id| {
                let record = self.jobs.get(id)?;
                let verdict = evaluate(&record.constraints, snapshot, record.submitted_at);
                verdict.is_satisfied().then_some((*id, verdict))
            })
            .collect()
    }

    /// Move a pending job to `Running` and hand its payload over.
    pub fn start(&mut self, id: JobId) -> Option<(WorkOrder, StatusUpdate)> {
        let record = self.jobs.get_mut(&id)?;
        if record.state != JobState::Pending {
            return None;
        }
        self.waiting.remove(&id);

        record.state = JobState::Running;
        let input = record.payload.take().unwrap_or_default();
        let order = WorkOrder {
            target: WorkTarget::Job(id),
            unit: record.unit.clone(),
            input,
        };
        Some((order, record.status_update(StatusDetail::None)))
    }

    /// Running jobs whose constraints `snapshot` no longer satisfies and that
    /// have not been asked to halt yet.
    pub fn halt_candidates(&self, snapshot: &EnvironmentSnapshot) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|r| r.state == JobState::Running && !r.halt_requested)
            .filter(|r| !satisfied(&r.constraints, snapshot, r.submitted_at))
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn request_halt(&mut self, id: JobId) -> bool {
        match self.jobs.get_mut(&id) {
            Some(record) if record.state == JobState::Running && !record.halt_requested => {
                record.halt_requested = true;
                true
            }
            _ => false,
        }
    }

    /// Apply the executor's report for a running job.
    ///
    /// Reports for jobs that are no longer running (cancelled meanwhile) are
    /// stale and ignored.
    pub fn finish(&mut self, id: JobId, report: WorkReport, now: Instant) -> Option<StatusUpdate> {
        let Some(record) = self.jobs.get_mut(&id) else {
            debug!(job = %id, "report for unknown job ignored");
            return None;
        };
        if record.state != JobState::Running {
            debug!(job = %id, state = %record.state, "stale report ignored");
            return None;
        }

        let halted = std::mem::take(&mut record.halt_requested);
        let WorkReport {
            outcome,
            input,
            attempts,
            ..
        } = report;

        let (state, detail) = match outcome {
            Outcome::Success(output) => (JobState::Succeeded, StatusDetail::Output(output)),
            Outcome::Failure(reason) if halted => {
                info!(job = %id, %reason, "halted job did not ask to be rescheduled; dropping it");
                (
                    JobState::Cancelled,
                    StatusDetail::Error {
                        stage: None,
                        reason,
                    },
                )
            }
            Outcome::Failure(reason) => (
                JobState::Failed,
                StatusDetail::Error {
                    stage: None,
                    reason,
                },
            ),
            Outcome::Retry => {
                info!(job = %id, halted, attempts, "job rescheduled; back in the wait set");
                record.state = JobState::Pending;
                record.payload = Some(input);
                self.waiting.insert(id);
                return Some(record.status_update(StatusDetail::None));
            }
        };

        info!(job = %id, %state, attempts, "job finished");
        record.state = state;
        record.finished_at = Some(now);
        Some(record.status_update(detail))
    }

    /// Cancel one live job.
    ///
    /// Returns the update plus the stop target if it was running.
    pub fn cancel(&mut self, id: JobId, now: Instant) -> Option<(StatusUpdate, Option<WorkTarget>)> {
        let record = self.jobs.get_mut(&id)?;
        if record.state.is_terminal() {
            return None;
        }

        let was_running = record.state == JobState::Running;
        self.waiting.remove(&id);
        record.state = JobState::Cancelled;
        record.payload = None;
        record.halt_requested = false;
        record.finished_at = Some(now);
        info!(job = %id, was_running, "job cancelled");

        let stop = was_running.then_some(WorkTarget::Job(id));
        Some((record.status_update(StatusDetail::None), stop))
    }

    /// Cancel every pending or running job, in id order.
    pub fn cancel_all(&mut self, now: Instant) -> Vec<(StatusUpdate, Option<WorkTarget>)> {
        let mut live: Vec<JobId> = self
            .jobs
            .values()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.id)
            .collect();
        live.sort();

        let cancelled: Vec<_> = live.into_iter().filter_map(|id| self.cancel(id, now)).collect();
        debug_assert!(self.waiting.is_empty());
        cancelled
    }

    /// Earliest override deadline among waiting jobs.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.waiting
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter_map(|r| r.constraints.deadline_from(r.submitted_at))
            .min()
    }

    pub fn next_eviction(&self, retention: Duration) -> Option<Instant> {
        self.jobs
            .values()
            .filter_map(|r| r.finished_at)
            .min()
            .and_then(|t| t.checked_add(retention))
    }

    /// Forget terminal jobs that finished at least `retention` ago.
    pub fn evict_expired(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, r| match r.finished_at {
            Some(finished) => finished
                .checked_add(retention)
                .is_none_or(|evict_at| now < evict_at),
            None => true,
        });
        let evicted = before - self.jobs.len();
        if evicted > 0 {
            debug!(evicted, "evicted finished jobs");
        }
        evicted
    }

    pub fn live_count(&self) -> usize {
        self.jobs.values().filter(|r| !r.state.is_terminal()).count()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_waiting(&self, id: JobId) -> bool {
        self.waiting.contains(&id)
    }
}
