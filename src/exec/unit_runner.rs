// src/exec/unit_runner.rs

//! Runs a single work order on the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::{EngineEvent, RuntimeEvent};
use crate::work::{Data, Outcome, WorkContext};

use super::{WorkOrder, WorkReport};

/// Run `order` and send its report back as `EngineEvent::WorkFinished`.
///
/// - The unit only starts once a pool slot is free; a stop request while
///   waiting reports `Retry` without invoking it.
/// - `Retry` re-invokes the unit with the same input after `retry_backoff`,
///   for as long as no stop was requested.
/// - A panicking unit is reported as `Failure`.
pub async fn run_order(
    order: WorkOrder,
    stop: CancellationToken,
    slots: Arc<Semaphore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    retry_backoff: Duration,
) {
    let target = order.target;
    let report = execute(order, &stop, &slots, retry_backoff).await;

    debug!(
        work = %target,
        attempts = report.attempts,
        stopped = report.stopped,
        success = report.outcome.is_success(),
        "order finished"
    );

    let event = EngineEvent::WorkFinished { target, report };
    if runtime_tx.send(RuntimeEvent::Engine(event)).await.is_err() {
        debug!(work = %target, "runtime gone; report dropped");
    }
}

async fn execute(
    order: WorkOrder,
    stop: &CancellationToken,
    slots: &Semaphore,
    retry_backoff: Duration,
) -> WorkReport {
    let WorkOrder {
        target,
        unit,
        input,
    } = order;
    let mut input = input;

    let _permit = tokio::select! {
        permit = slots.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return WorkReport {
                    outcome: Outcome::failure("executor pool closed"),
                    input,
                    stopped: false,
                    attempts: 0,
                };
            }
        },
        _ = stop.cancelled() => {
            debug!(work = %target, "stopped while waiting for a pool slot");
            return WorkReport {
                outcome: Outcome::Retry,
                input,
                stopped: true,
                attempts: 0,
            };
        }
    };

    let mut attempts = 0;
    loop {
        attempts += 1;
        info!(work = %target, unit = %unit.name(), attempt = attempts, "running unit");

        let ctx = WorkContext::new(input, attempts, stop.clone());
        let runner = unit.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = runner.run(&ctx);
            (outcome, ctx.into_input())
        })
        .await;

        let outcome = match joined {
            Ok((outcome, returned)) => {
                input = returned;
                outcome
            }
            Err(err) => {
                error!(work = %target, unit = %unit.name(), error = %err, "unit panicked");
                return WorkReport {
                    outcome: Outcome::failure(format!("unit '{}' panicked", unit.name())),
                    input: Data::new(),
                    stopped: stop.is_cancelled(),
                    attempts,
                };
            }
        };

        let stopped = stop.is_cancelled();
        if outcome == Outcome::Retry && !stopped {
            debug!(work = %target, attempt = attempts, ?retry_backoff, "unit asked for a retry");
            tokio::select! {
                _ = tokio::time::sleep(retry_backoff) => continue,
                _ = stop.cancelled() => {
                    return WorkReport {
                        outcome: Outcome::Retry,
                        input,
                        stopped: true,
                        attempts,
                    };
                }
            }
        }

        return WorkReport {
            outcome,
            input,
            stopped,
            attempts,
        };
    }
}
