// src/chain/book.rs

//! All chain instances plus the unique-name registry.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::CoreStep;
use crate::errors::{ChainworkError, Result};
use crate::exec::{WorkReport, WorkTarget};
use crate::status::StatusDetail;
use crate::work::Outcome;

use super::record::{ChainRecord, StageAdvance};
use super::registry::{Admission, UniqueWorkRegistry};
use super::{ChainId, ChainRequest, ChainState, ChainSubmission};

#[derive(Debug, Default)]
pub struct ChainBook {
    chains: HashMap<ChainId, ChainRecord>,
    registry: UniqueWorkRegistry,
    next_id: u64,
}

impl ChainBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ChainId) -> Option<&ChainRecord> {
        self.chains.get(&id)
    }

    pub fn state_of(&self, id: ChainId) -> Option<ChainState> {
        self.chains.get(&id).map(ChainRecord::state)
    }

    pub fn registry(&self) -> &UniqueWorkRegistry {
        &self.registry
    }

    /// Validate a submission and apply its conflict policy.
    pub fn submit(
        &mut self,
        request: ChainRequest,
        now: Instant,
        step: &mut CoreStep,
    ) -> Result<ChainSubmission> {
        validate_request(&request)?;

        let ChainRequest {
            name,
            policy,
            stages,
            seed,
        } = request;

        let id = ChainId(self.next_id + 1);
        let admission = self.registry.admit(&name, policy, id);

        if let Admission::Ignore { existing } = admission {
            info!(%name, %existing, "chain already active under this name; submission ignored");
            return Ok(ChainSubmission::Ignored { existing });
        }
        self.next_id += 1;

        let mut record = ChainRecord::new(id, name, policy, stages, seed);
        info!(chain = %id, name = %record.name(), %policy, stages = record.stage_count(), "chain accepted");
        step.publish(record.status_update(StatusDetail::None));

        let submission = match admission {
            Admission::Start { superseded } => {
                for old in superseded {
                    info!(chain = %old, name = %record.name(), "replaced by a new submission");
                    self.cancel_instance(old, now, step);
                }
                start_stage(&mut record, step);
                ChainSubmission::Started(id)
            }
            Admission::Enqueue { behind } => {
                info!(chain = %id, %behind, "chain appended; waiting for its turn");
                ChainSubmission::Queued(id)
            }
            Admission::Ignore { existing } => ChainSubmission::Ignored { existing },
        };

        self.chains.insert(id, record);
        Ok(submission)
    }

    /// Apply the executor's report for stage `index` of `chain`.
    pub fn stage_finished(
        &mut self,
        chain: ChainId,
        index: usize,
        report: WorkReport,
        now: Instant,
        step: &mut CoreStep,
    ) {
        let Some(record) = self.chains.get_mut(&chain) else {
            debug!(%chain, "report for unknown chain ignored");
            return;
        };
        if record.state() != (ChainState::Running { stage: index }) {
            debug!(%chain, index, state = %record.state(), "stale stage report ignored");
            return;
        }

        let WorkReport {
            outcome,
            input,
            attempts,
            ..
        } = report;

        match outcome {
            Outcome::Success(output) => match record.complete_stage(output, now) {
                StageAdvance::Next => {
                    debug!(%chain, finished = index, attempts, "stage succeeded; advancing");
                    start_stage(record, step);
                }
                StageAdvance::Completed(output) => {
                    info!(%chain, name = %record.name(), "chain completed");
                    step.publish(record.status_update(StatusDetail::Output(output)));
                    let name = record.name().to_string();
                    self.release(&name, chain, step);
                }
            },
            Outcome::Retry => {
                debug!(%chain, index, attempts, "stage asked for a retry");
                if let Some(order) = record.retry_stage(input) {
                    step.dispatch(order);
                }
            }
            Outcome::Failure(reason) => {
                let stage = record.current_stage_name().map(str::to_string);
                warn!(%chain, name = %record.name(), stage = ?stage, %reason, "stage failed; chain stops");
                record.fail(now);
                step.publish(record.status_update(StatusDetail::Error { stage, reason }));
                let name = record.name().to_string();
                self.release(&name, chain, step);
            }
        }
    }

    /// Cancel the running instance of `name` and everything appended to it.
    pub fn cancel_name(&mut self, name: &str, now: Instant, step: &mut CoreStep) -> usize {
        let ids = self.registry.remove(name);
        ids.into_iter()
            .filter(|id| self.cancel_instance(*id, now, step))
            .count()
    }

    /// Cancel every live chain (shutdown).
    pub fn cancel_all(&mut self, now: Instant, step: &mut CoreStep) -> usize {
        let mut names: Vec<String> = self.registry.names().map(str::to_string).collect();
        names.sort();
        names
            .iter()
            .map(|name| self.cancel_name(name, now, step))
            .sum()
    }

    /// Move one instance to `Cancelled`, stopping its running stage.
    ///
    /// Does not touch the registry.
    fn cancel_instance(&mut self, id: ChainId, now: Instant, step: &mut CoreStep) -> bool {
        let Some(record) = self.chains.get_mut(&id) else {
            return false;
        };
        if record.state().is_terminal() {
            return false;
        }
        if let ChainState::Running { stage } = record.state() {
            step.stop(WorkTarget::Stage { chain: id, index: stage });
        }
        record.cancel(now);
        info!(chain = %id, name = %record.name(), "chain cancelled");
        step.publish(record.status_update(StatusDetail::None));
        true
    }

    /// Hand the name over to the next appended instance, if any.
    fn release(&mut self, name: &str, id: ChainId, step: &mut CoreStep) {
        let Some(next) = self.registry.release(name, id) else {
            return;
        };
        match self.chains.get_mut(&next) {
            Some(record) => {
                info!(chain = %next, %name, "starting appended chain");
                start_stage(record, step);
            }
            None => warn!(chain = %next, %name, "appended chain missing from the book"),
        }
    }

    pub fn live_count(&self) -> usize {
        self.chains
            .values()
            .filter(|r| !r.state().is_terminal())
            .count()
    }

    pub fn next_eviction(&self, retention: Duration) -> Option<Instant> {
        self.chains
            .values()
            .filter_map(ChainRecord::finished_at)
            .min()
            .and_then(|t| t.checked_add(retention))
    }

    pub fn evict_expired(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.chains.len();
        self.chains.retain(|_, r| match r.finished_at() {
            Some(finished) => finished
                .checked_add(retention)
                .is_none_or(|evict_at| now < evict_at),
            None => true,
        });
        let evicted = before - self.chains.len();
        if evicted > 0 {
            debug!(evicted, "evicted finished chains");
        }
        evicted
    }

    /// At most one running instance per name, and the registry agrees with the
    /// recorded states.
    pub fn registry_consistent(&self) -> bool {
        let mut running_per_name: HashMap<&str, usize> = HashMap::new();
        for record in self.chains.values().filter(|r| r.state().is_running()) {
            *running_per_name.entry(record.name()).or_default() += 1;
            if self.registry.current(record.name()) != Some(record.id()) {
                return false;
            }
        }
        if running_per_name.values().any(|n| *n > 1) {
            return false;
        }

        self.registry.names().all(|name| {
            let current_live = self
                .registry
                .current(name)
                .and_then(|id| self.state_of(id))
                .is_some_and(|s| !s.is_terminal());
            let appended_queued = self
                .registry
                .appended(name)
                .into_iter()
                .all(|id| self.state_of(id) == Some(ChainState::Queued));
            current_live && appended_queued
        })
    }
}

/// Start the record's current stage and publish `Running(stage)`.
fn start_stage(record: &mut ChainRecord, step: &mut CoreStep) {
    let Some(order) = record.start_stage() else {
        return;
    };
    let stage = order.unit.name().to_string();
    debug!(chain = %record.id(), index = record.stage_index(), %stage, "dispatching stage");
    step.publish(record.status_update(StatusDetail::Stage(stage)));
    step.dispatch(order);
}

fn validate_request(request: &ChainRequest) -> Result<()> {
    if request.name.trim().is_empty() {
        return Err(ChainworkError::InvalidChain {
            name: request.name.clone(),
            reason: "chain name must not be empty".to_string(),
        });
    }
    if request.stages.is_empty() {
        return Err(ChainworkError::InvalidChain {
            name: request.name.clone(),
            reason: "a chain needs at least one stage".to_string(),
        });
    }
    Ok(())
}
