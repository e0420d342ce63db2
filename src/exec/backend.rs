// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `PoolExecutor` is the default implementation used by `chainwork`. It
//!   wraps the `spawn_executor` loop and forwards orders and stop requests
//!   over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, runs
//!   units inline and directly emits `WorkFinished` events.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::RuntimeEvent;
use crate::errors::{ChainworkError, Result};

use super::executor_loop::{spawn_executor, ExecutorCommand};
use super::{WorkOrder, WorkTarget};

/// Trait abstracting how work orders are executed.
///
/// Production code uses [`PoolExecutor`]; tests can provide their own
/// implementation that doesn't need a worker pool.
pub trait ExecutorBackend: Send {
    /// Start running `order`. The implementation reports back with
    /// `EngineEvent::WorkFinished` once the unit is done.
    fn dispatch(
        &mut self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Raise the stop signal for whatever runs for `target`.
    fn stop(&mut self, target: WorkTarget) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sizing and retry behaviour of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Number of units that may run at the same time.
    pub workers: usize,
    /// Pause before re-invoking a unit that returned `Retry`.
    pub retry_backoff: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Executor backend used in production.
///
/// Internally, this wraps the executor loop in [`spawn_executor`]. The
/// runtime calls `dispatch` / `stop`, which are forwarded to the background
/// loop via an mpsc channel.
pub struct PoolExecutor {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl PoolExecutor {
    /// Create a new pool executor, wiring it to the given runtime event
    /// sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, options: PoolOptions) -> Self {
        let tx = spawn_executor(runtime_tx, options);
        Self { tx }
    }

    fn send(&self, command: ExecutorCommand) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(command)
                .await
                .map_err(|_| ChainworkError::EngineStopped)
        })
    }
}

impl ExecutorBackend for PoolExecutor {
    fn dispatch(
        &mut self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::Run(order))
    }

    fn stop(&mut self, target: WorkTarget) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::Stop(target))
    }
}
