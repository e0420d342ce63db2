// src/chain/mod.rs

//! Named work chains.
//!
//! - [`record`] is one chain instance: its stages, the data carried between
//!   them and its state.
//! - [`registry`] maps unique chain names to their running and appended
//!   instances and applies the conflict policy on re-submission.
//! - [`book`] owns all chain instances plus the registry and drives them
//!   stage by stage.

use std::fmt;
use std::str::FromStr;

use crate::types::ConflictPolicy;
use crate::work::{Data, WorkUnit};

pub mod book;
pub mod record;
pub mod registry;

pub use book::ChainBook;
pub use record::{ChainRecord, StageAdvance};
pub use registry::{Admission, UniqueWorkRegistry};

/// Identifier of one chain instance (several instances may share a name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("chain-").unwrap_or(s.trim());
        digits
            .parse::<u64>()
            .map(ChainId)
            .map_err(|_| format!("invalid chain id: {s} (expected e.g. \"chain-2\")"))
    }
}

/// Lifecycle of a chain instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Accepted, waiting for its turn (or just about to start).
    Queued,
    /// Stage `stage` (0-based) is executing.
    Running { stage: usize },
    Completed,
    Failed,
    Cancelled,
}

impl ChainState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChainState::Completed | ChainState::Failed | ChainState::Cancelled
        )
    }

    pub fn is_running(self) -> bool {
        matches!(self, ChainState::Running { .. })
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Queued => f.write_str("queued"),
            ChainState::Running { stage } => write!(f, "running(stage {stage})"),
            ChainState::Completed => f.write_str("completed"),
            ChainState::Failed => f.write_str("failed"),
            ChainState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A chain submission.
#[derive(Debug, Clone)]
pub struct ChainRequest {
    /// Unique name the conflict policy is keyed on.
    pub name: String,
    pub policy: ConflictPolicy,
    /// Executed strictly in order; each stage's output feeds the next.
    pub stages: Vec<WorkUnit>,
    /// Input of the first stage.
    pub seed: Data,
}

impl ChainRequest {
    pub fn new(name: impl Into<String>, policy: ConflictPolicy, stages: Vec<WorkUnit>) -> Self {
        Self {
            name: name.into(),
            policy,
            stages,
            seed: Data::new(),
        }
    }

    pub fn with_seed(mut self, seed: Data) -> Self {
        self.seed = seed;
        self
    }
}

/// What became of an accepted chain submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSubmission {
    /// Registered and running from stage 0.
    Started(ChainId),
    /// Appended behind the instance currently holding the name.
    Queued(ChainId),
    /// KEEP found a live instance; nothing was registered.
    Ignored { existing: ChainId },
}

impl ChainSubmission {
    /// Id of the new instance, if one was created.
    pub fn id(&self) -> Option<ChainId> {
        match self {
            ChainSubmission::Started(id) | ChainSubmission::Queued(id) => Some(*id),
            ChainSubmission::Ignored { .. } => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ChainSubmission::Ignored { .. })
    }
}
