// src/status/mod.rs

//! Live status of jobs and chains.
//!
//! - The core produces [`StatusUpdate`]s for every state transition.
//! - The runtime stamps them into [`StatusEvent`]s and fans them out through
//!   the [`stream::StatusStream`] to every matching subscriber.
//! - [`sink`] is the persistence hook: each transition is also offered to an
//!   optional [`sink::TransitionSink`] as a flat [`sink::TransitionRecord`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::chain::{ChainId, ChainState};
use crate::jobs::{JobId, JobState};
use crate::work::Data;

pub mod sink;
pub mod stream;

pub use sink::{JsonLinesSink, MemorySink, TransitionRecord, TransitionSink};
pub use stream::{StatusStream, StatusSubscription};

/// Anything the engine tracks a status for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Job(JobId),
    Chain(ChainId),
}

impl EntityId {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityId::Job(_) => "job",
            EntityId::Chain(_) => "chain",
        }
    }
}

impl From<JobId> for EntityId {
    fn from(id: JobId) -> Self {
        EntityId::Job(id)
    }
}

impl From<ChainId> for EntityId {
    fn from(id: ChainId) -> Self {
        EntityId::Chain(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Job(id) => id.fmt(f),
            EntityId::Chain(id) => id.fmt(f),
        }
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("job-") {
            s.parse().map(EntityId::Job)
        } else if s.starts_with("chain-") {
            s.parse().map(EntityId::Chain)
        } else {
            Err(format!("invalid id: {s} (expected job-N or chain-N)"))
        }
    }
}

/// Current state of a job or chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Job(JobState),
    Chain(ChainState),
}

impl EntityState {
    pub fn is_terminal(&self) -> bool {
        match self {
            EntityState::Job(s) => s.is_terminal(),
            EntityState::Chain(s) => s.is_terminal(),
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Job(s) => s.fmt(f),
            EntityState::Chain(s) => s.fmt(f),
        }
    }
}

/// Extra information attached to a transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StatusDetail {
    #[default]
    None,
    /// Name of the stage that just started.
    Stage(String),
    /// Final output of a succeeded job or completed chain.
    Output(Data),
    /// Why a job or chain failed (or was dropped after a halt).
    Error {
        stage: Option<String>,
        reason: String,
    },
}

impl StatusDetail {
    /// One-line rendering used for logs, the CLI and sink records.
    pub fn summary(&self) -> Option<String> {
        match self {
            StatusDetail::None => None,
            StatusDetail::Stage(name) => Some(format!("stage {name}")),
            StatusDetail::Output(data) => Some(data.summary()),
            StatusDetail::Error {
                stage: Some(stage),
                reason,
            } => Some(format!("stage {stage}: {reason}")),
            StatusDetail::Error {
                stage: None,
                reason,
            } => Some(reason.clone()),
        }
    }
}

/// A state transition as produced by the core (not yet timestamped).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub entity: EntityId,
    /// Unique chain name; `None` for jobs.
    pub name: Option<String>,
    pub tags: BTreeSet<String>,
    pub state: EntityState,
    pub detail: StatusDetail,
}

impl StatusUpdate {
    pub fn stamp(self, at: DateTime<Utc>) -> StatusEvent {
        StatusEvent {
            entity: self.entity,
            name: self.name,
            tags: self.tags,
            state: self.state,
            detail: self.detail,
            at,
        }
    }
}

/// A state transition as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub entity: EntityId,
    pub name: Option<String>,
    pub tags: BTreeSet<String>,
    pub state: EntityState,
    pub detail: StatusDetail,
    pub at: DateTime<Utc>,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.at.format("%H:%M:%S%.3f"), self.entity)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        write!(f, " {}", self.state)?;
        if let Some(summary) = self.detail.summary() {
            write!(f, " {summary}")?;
        }
        Ok(())
    }
}

/// Which transitions a subscriber wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Job(JobId),
    Chain(ChainId),
    /// Every instance submitted under this unique chain name.
    UniqueName(String),
    Tag(String),
}

impl StatusFilter {
    pub fn matches(&self, event: &StatusEvent) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Job(id) => event.entity == EntityId::Job(*id),
            StatusFilter::Chain(id) => event.entity == EntityId::Chain(*id),
            StatusFilter::UniqueName(name) => event.name.as_deref() == Some(name.as_str()),
            StatusFilter::Tag(tag) => event.tags.contains(tag),
        }
    }
}

impl From<EntityId> for StatusFilter {
    fn from(id: EntityId) -> Self {
        match id {
            EntityId::Job(id) => StatusFilter::Job(id),
            EntityId::Chain(id) => StatusFilter::Chain(id),
        }
    }
}
