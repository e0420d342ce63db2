// src/exec/mod.rs

//! Execution layer.
//!
//! Runs work units for jobs and chain stages and reports every finished
//! order back to the engine as an `EngineEvent::WorkFinished`.
//!
//! - [`backend`] provides the [`ExecutorBackend`] trait the runtime talks to,
//!   and the production [`PoolExecutor`]; tests substitute fakes.
//! - [`executor_loop`] owns the background loop that tracks active orders and
//!   their stop signals.
//! - [`unit_runner`] runs one order on a pool slot, retrying on
//!   `Outcome::Retry` until a stop is requested.

use std::fmt;

use crate::chain::ChainId;
use crate::jobs::JobId;
use crate::work::{Data, Outcome, WorkUnit};

pub mod backend;
pub mod executor_loop;
pub mod unit_runner;

pub use backend::{ExecutorBackend, PoolExecutor, PoolOptions};
pub use executor_loop::spawn_executor;

/// What a dispatched unit is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTarget {
    Job(JobId),
    Stage { chain: ChainId, index: usize },
}

impl fmt::Display for WorkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkTarget::Job(id) => id.fmt(f),
            WorkTarget::Stage { chain, index } => write!(f, "{chain}/stage-{index}"),
        }
    }
}

/// A unit handed to the executor, together with its input.
///
/// The input is moved in; it comes back inside the [`WorkReport`].
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub target: WorkTarget,
    pub unit: WorkUnit,
    pub input: Data,
}

/// Result of running a [`WorkOrder`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkReport {
    pub outcome: Outcome,
    /// The order's input, handed back for re-dispatch.
    pub input: Data,
    /// Whether the stop signal was raised before the unit returned.
    pub stopped: bool,
    /// Number of invocations of the unit for this order.
    pub attempts: u32,
}

impl WorkReport {
    pub fn new(outcome: Outcome, input: Data) -> Self {
        Self {
            outcome,
            input,
            stopped: false,
            attempts: 1,
        }
    }
}
