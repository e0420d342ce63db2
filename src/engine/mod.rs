// src/engine/mod.rs

//! Orchestration engine for chainwork.
//!
//! This module ties together:
//! - the job table and its constraint wait set
//! - the chain book and the unique-name registry
//! - the runtime event loop that reacts to:
//!   - submissions and cancellations from the [`Scheduler`] handle
//!   - environment updates
//!   - deadline ticks
//!   - finished work from the executor
//!   - shutdown requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]; [`handle`] is the cloneable façade callers use.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::chain::{ChainRequest, ChainSubmission};
use crate::constraints::Environment;
use crate::errors::Result;
use crate::exec::{WorkReport, WorkTarget};
use crate::jobs::{JobId, JobRequest};
use crate::status::{EntityId, EntityState};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;

pub use core::EngineCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::Scheduler;
pub use runtime::Runtime;

/// Default time terminal jobs and chains stay queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Exit the runtime once no job or chain is live (used for `--once`).
    pub exit_when_idle: bool,
    /// How long terminal jobs and chains are kept for status queries.
    pub retention: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            exit_when_idle: false,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Everything the core reacts to.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SubmitJob(JobRequest),
    CancelAllJobs,
    CancelJob(JobId),
    SubmitChain(ChainRequest),
    /// Cancel every live instance under a unique chain name.
    CancelChain(String),
    EnvironmentChanged(Environment),
    /// Re-evaluate deadlines and retention.
    DeadlineTick,
    /// The executor finished an order.
    WorkFinished {
        target: WorkTarget,
        report: WorkReport,
    },
    QueryStatus(EntityId),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Synchronous answer to a request.
#[derive(Debug)]
pub enum Reply {
    Job(Result<JobId>),
    Chain(Result<ChainSubmission>),
    Status(Option<EntityState>),
    /// Number of jobs or chains newly cancelled.
    Cancelled(usize),
    Ack,
}

/// What flows over the runtime channel.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// Fire-and-forget event (executor reports, signal handlers).
    Engine(EngineEvent),
    /// Event whose [`Reply`] the sender awaits.
    Request {
        event: EngineEvent,
        reply: oneshot::Sender<Reply>,
    },
}

impl From<EngineEvent> for RuntimeEvent {
    fn from(event: EngineEvent) -> Self {
        RuntimeEvent::Engine(event)
    }
}
