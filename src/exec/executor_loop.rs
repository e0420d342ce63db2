// src/exec/executor_loop.rs

//! Background loop that tracks running orders and their stop signals.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::exec::unit_runner::run_order;

use super::{PoolOptions, WorkOrder, WorkTarget};

/// Message from the backend to the executor loop.
#[derive(Debug)]
pub enum ExecutorCommand {
    Run(WorkOrder),
    Stop(WorkTarget),
}

/// Internal handle for an order whose runner has not finished yet.
///
/// - `stop` is the order's stop signal, shared with the running unit.
/// - `handle` is the Tokio task driving the order.
struct ActiveOrder {
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what [`PoolExecutor`](super::PoolExecutor) uses.
/// Each order runs in its own Tokio task and waits for one of
/// `options.workers` slots before its unit is invoked, so at most that many
/// units run at the same time.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    options: PoolOptions,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);
    let workers = options.workers.max(1);
    let slots = Arc::new(Semaphore::new(workers));

    tokio::spawn(async move {
        info!(workers, "executor loop started");

        let mut active: HashMap<WorkTarget, ActiveOrder> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, order| !order.handle.is_finished());

            match command {
                ExecutorCommand::Run(order) => {
                    handle_run(order, &mut active, &slots, &runtime_tx, options);
                }
                ExecutorCommand::Stop(target) => handle_stop(target, &active),
            }
        }

        for (target, order) in active.drain() {
            debug!(work = %target, "executor shutting down; stopping order");
            order.stop.cancel();
        }
        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Spawn a runner for a newly dispatched order.
fn handle_run(
    order: WorkOrder,
    active: &mut HashMap<WorkTarget, ActiveOrder>,
    slots: &Arc<Semaphore>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    options: PoolOptions,
) {
    let target = order.target;

    // The engine only re-dispatches a target after its previous report, so a
    // leftover entry is a runner that is just winding down.
    if let Some(previous) = active.remove(&target) {
        debug!(work = %target, "previous runner for this target still finishing");
        previous.stop.cancel();
    }

    let stop = CancellationToken::new();
    let handle = tokio::spawn(run_order(
        order,
        stop.clone(),
        Arc::clone(slots),
        runtime_tx.clone(),
        options.retry_backoff,
    ));

    active.insert(target, ActiveOrder { stop, handle });
}

/// Raise the stop signal of a running order.
fn handle_stop(target: WorkTarget, active: &HashMap<WorkTarget, ActiveOrder>) {
    match active.get(&target) {
        Some(order) => {
            info!(work = %target, "stop requested for running order");
            order.stop.cancel();
        }
        None => debug!(work = %target, "stop requested but order already finished"),
    }
}
