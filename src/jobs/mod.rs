// src/jobs/mod.rs

//! Constraint-gated one-shot jobs.
//!
//! - [`table`] owns every job record plus the wait set of `Pending` jobs and
//!   implements their state transitions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::constraints::ConstraintSet;
use crate::work::{Data, WorkUnit};

pub mod table;

pub use table::{JobRecord, JobTable};

/// Identifier handed out by the engine when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("job-").unwrap_or(s.trim());
        digits
            .parse::<u64>()
            .map(JobId)
            .map_err(|_| format!("invalid job id: {s} (expected e.g. \"job-3\")"))
    }
}

/// Lifecycle of a job.
///
/// `Pending → Running → {Succeeded, Failed}`; `Cancelled` is reachable from
/// `Pending` and `Running`. A running job that was halted by the environment
/// and asked to be rescheduled goes back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A job submission: what to run, with which payload, under which
/// constraints.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub unit: WorkUnit,
    pub payload: Data,
    pub constraints: ConstraintSet,
    /// Extra tags for status subscriptions, on top of the unit's own tags.
    pub tags: BTreeSet<String>,
}

impl JobRequest {
    pub fn new(unit: WorkUnit, constraints: ConstraintSet) -> Self {
        Self {
            unit,
            payload: Data::new(),
            constraints,
            tags: BTreeSet::new(),
        }
    }
}
