// src/chain/record.rs

use std::collections::BTreeSet;

use tokio::time::Instant;

use crate::exec::{WorkOrder, WorkTarget};
use crate::status::{EntityId, EntityState, StatusDetail, StatusUpdate};
use crate::types::ConflictPolicy;
use crate::work::{Data, WorkUnit};

use super::{ChainId, ChainState};

/// Result of a stage completing successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAdvance {
    /// Another stage follows; its input is now carried.
    Next,
    /// That was the last stage.
    Completed(Data),
}

/// One chain instance.
///
/// `carried` is the seed before stage 0 runs and the output of stage `i - 1`
/// before stage `i` runs. It is `None` while a stage owns it.
#[derive(Debug, Clone)]
pub struct ChainRecord {
    id: ChainId,
    name: String,
    policy: ConflictPolicy,
    stages: Vec<WorkUnit>,
    stage_index: usize,
    carried: Option<Data>,
    state: ChainState,
    tags: BTreeSet<String>,
    invocations: usize,
    finished_at: Option<Instant>,
}

impl ChainRecord {
    pub fn new(
        id: ChainId,
        name: String,
        policy: ConflictPolicy,
        stages: Vec<WorkUnit>,
        seed: Data,
    ) -> Self {
        let tags = stages.iter().flat_map(|s| s.tags().iter().cloned()).collect();
        Self {
            id,
            name,
            policy,
            stages,
            stage_index: 0,
            carried: Some(seed),
            state: ChainState::Queued,
            tags,
            invocations: 0,
            finished_at: None,
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn carried(&self) -> Option<&Data> {
        self.carried.as_ref()
    }

    /// Total unit invocations across all stages, retries included.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    pub fn current_stage_name(&self) -> Option<&str> {
        self.stages.get(self.stage_index).map(WorkUnit::name)
    }

    /// Start the current stage with the carried data.
    pub fn start_stage(&mut self) -> Option<WorkOrder> {
        if self.state.is_terminal() {
            return None;
        }
        let unit = self.stages.get(self.stage_index)?.clone();
        let input = self.carried.take().unwrap_or_default();
        Some(self.dispatch(unit, input))
    }

    /// Run the current stage again with the input it was given.
    pub fn retry_stage(&mut self, input: Data) -> Option<WorkOrder> {
        if !self.state.is_running() {
            return None;
        }
        let unit = self.stages.get(self.stage_index)?.clone();
        Some(self.dispatch(unit, input))
    }

    fn dispatch(&mut self, unit: WorkUnit, input: Data) -> WorkOrder {
        self.state = ChainState::Running {
            stage: self.stage_index,
        };
        self.invocations += 1;
        WorkOrder {
            target: WorkTarget::Stage {
                chain: self.id,
                index: self.stage_index,
            },
            unit,
            input,
        }
    }

    /// Record the current stage's output and move to the next stage.
    pub fn complete_stage(&mut self, output: Data, now: Instant) -> StageAdvance {
        self.stage_index += 1;
        if self.stage_index >= self.stages.len() {
            self.state = ChainState::Completed;
            self.finished_at = Some(now);
            self.carried = Some(output.clone());
            StageAdvance::Completed(output)
        } else {
            self.carried = Some(output);
            StageAdvance::Next
        }
    }

    pub fn fail(&mut self, now: Instant) {
        self.finish(ChainState::Failed, now);
    }

    pub fn cancel(&mut self, now: Instant) {
        self.finish(ChainState::Cancelled, now);
    }

    fn finish(&mut self, state: ChainState, now: Instant) {
        self.state = state;
        self.carried = None;
        self.finished_at = Some(now);
    }

    pub fn status_update(&self, detail: StatusDetail) -> StatusUpdate {
        StatusUpdate {
            entity: EntityId::Chain(self.id),
            name: Some(self.name.clone()),
            tags: self.tags.clone(),
            state: EntityState::Chain(self.state),
            detail,
        }
    }
}
