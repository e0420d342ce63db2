use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chainwork::engine::{EngineEvent, RuntimeEvent};
use chainwork::errors::{ChainworkError, Result};
use chainwork::exec::{ExecutorBackend, WorkOrder, WorkReport, WorkTarget};
use chainwork::work::{Outcome, WorkContext};

/// Invocations after which an always-retrying unit is reported as failed.
const RETRY_LIMIT: u32 = 32;

/// A fake executor that:
/// - records which targets were dispatched and stopped
/// - runs each unit inline (retrying on `Retry`)
/// - immediately reports `WorkFinished` for each order.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<WorkTarget>>>,
    stopped: Arc<Mutex<Vec<WorkTarget>>>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<WorkTarget>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            stopped: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_stop_log(mut self, stopped: Arc<Mutex<Vec<WorkTarget>>>) -> Self {
        self.stopped = stopped;
        self
    }
}

/// Run `order` to a report on the current thread.
pub fn run_inline(order: WorkOrder) -> WorkReport {
    let WorkOrder { unit, input, .. } = order;
    let mut input = input;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let ctx = WorkContext::new(input, attempts, CancellationToken::new());
        let outcome = unit.run(&ctx);
        input = ctx.into_input();

        match outcome {
            Outcome::Retry if attempts < RETRY_LIMIT => continue,
            Outcome::Retry => {
                return WorkReport {
                    outcome: Outcome::failure("retry limit reached"),
                    input,
                    stopped: false,
                    attempts,
                };
            }
            outcome => {
                return WorkReport {
                    outcome,
                    input,
                    stopped: false,
                    attempts,
                };
            }
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            let target = order.target;
            executed.lock().unwrap().push(target);

            let report = run_inline(order);
            tx.send(RuntimeEvent::Engine(EngineEvent::WorkFinished { target, report }))
                .await
                .map_err(|_| ChainworkError::EngineStopped)?;
            Ok(())
        })
    }

    fn stop(&mut self, target: WorkTarget) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let stopped = Arc::clone(&self.stopped);
        Box::pin(async move {
            stopped.lock().unwrap().push(target);
            Ok(())
        })
    }
}
