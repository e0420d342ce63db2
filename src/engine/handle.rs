// src/engine/handle.rs

//! Cloneable façade over a running engine.

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};

use crate::chain::{ChainRequest, ChainSubmission};
use crate::constraints::Environment;
use crate::errors::{ChainworkError, Result};
use crate::jobs::{JobId, JobRequest};
use crate::status::{EntityId, EntityState, StatusFilter, StatusStream, StatusSubscription};

use super::{EngineEvent, Reply, RuntimeEvent};

/// What callers use to talk to the engine.
///
/// Every operation is a message to the runtime task, which owns all job and
/// chain state. Submission errors come back synchronously; what happens to
/// accepted work afterwards is only visible through [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<RuntimeEvent>,
    status: StatusStream,
}

impl Scheduler {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>, status: StatusStream) -> Self {
        Self { tx, status }
    }

    /// Submit a constraint-gated job.
    ///
    /// Fails with [`ChainworkError::InvalidConstraints`] when the request has
    /// no active constraint.
    pub async fn submit_job(&self, request: JobRequest) -> Result<JobId> {
        match self.request(EngineEvent::SubmitJob(request)).await? {
            Reply::Job(result) => result,
            other => Err(unexpected(other)),
        }
    }

    /// Cancel every pending or running job. Returns how many were cancelled.
    pub async fn cancel_all_jobs(&self) -> Result<usize> {
        self.cancelled(EngineEvent::CancelAllJobs).await
    }

    pub async fn cancel_job(&self, id: JobId) -> Result<usize> {
        self.cancelled(EngineEvent::CancelJob(id)).await
    }

    /// Submit a named chain under its conflict policy.
    pub async fn submit_chain(&self, request: ChainRequest) -> Result<ChainSubmission> {
        match self.request(EngineEvent::SubmitChain(request)).await? {
            Reply::Chain(result) => result,
            other => Err(unexpected(other)),
        }
    }

    /// Cancel the running instance of `name` and every appended one.
    pub async fn cancel_chain(&self, name: impl Into<String>) -> Result<usize> {
        self.cancelled(EngineEvent::CancelChain(name.into())).await
    }

    /// Push a new environment snapshot.
    pub async fn update_environment(&self, environment: Environment) -> Result<()> {
        self.request(EngineEvent::EnvironmentChanged(environment))
            .await
            .map(drop)
    }

    /// Re-evaluate deadlines now (and exit if idle in `--once` mode).
    pub async fn wake(&self) -> Result<()> {
        self.request(EngineEvent::DeadlineTick).await.map(drop)
    }

    /// Current state, or `None` for unknown or evicted ids.
    pub async fn status_of(&self, id: impl Into<EntityId>) -> Result<Option<EntityState>> {
        match self.request(EngineEvent::QueryStatus(id.into())).await? {
            Reply::Status(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    /// Live feed of transitions matching `filter`.
    ///
    /// Only transitions published after this call are delivered.
    pub fn subscribe(&self, filter: StatusFilter) -> StatusSubscription {
        self.status.subscribe(filter)
    }

    /// Cancel everything that is still live and stop the runtime.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(EngineEvent::ShutdownRequested).await.map(drop)
    }

    /// Raw sender, for wiring the executor or signal handlers.
    pub fn sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.tx.clone()
    }

    async fn cancelled(&self, event: EngineEvent) -> Result<usize> {
        match self.request(event).await? {
            Reply::Cancelled(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    async fn request(&self, event: EngineEvent) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RuntimeEvent::Request {
                event,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChainworkError::EngineStopped)?;
        reply_rx.await.map_err(|_| ChainworkError::EngineStopped)
    }
}

fn unexpected(reply: Reply) -> ChainworkError {
    ChainworkError::Other(anyhow!("unexpected engine reply: {reply:?}"))
}
