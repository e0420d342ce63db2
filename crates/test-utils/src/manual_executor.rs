use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use chainwork::engine::{EngineEvent, RuntimeEvent};
use chainwork::errors::{ChainworkError, Result};
use chainwork::exec::{ExecutorBackend, WorkOrder, WorkReport, WorkTarget};
use chainwork::work::Outcome;

#[derive(Default)]
struct Recorded {
    orders: Vec<WorkOrder>,
    stops: Vec<WorkTarget>,
}

/// An executor that runs nothing: it records orders and stop requests, and
/// the test decides when and how each order finishes through a
/// [`ManualHandle`].
pub struct ManualExecutor {
    recorded: Arc<Mutex<Recorded>>,
}

/// Test-side control of a [`ManualExecutor`].
#[derive(Clone)]
pub struct ManualHandle {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    recorded: Arc<Mutex<Recorded>>,
}

impl ManualExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> (Self, ManualHandle) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                recorded: Arc::clone(&recorded),
            },
            ManualHandle {
                runtime_tx,
                recorded,
            },
        )
    }
}

impl ManualHandle {
    /// Every target dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<WorkTarget> {
        self.recorded
            .lock()
            .unwrap()
            .orders
            .iter()
            .map(|o| o.target)
            .collect()
    }

    pub fn stops(&self) -> Vec<WorkTarget> {
        self.recorded.lock().unwrap().stops.clone()
    }

    /// Most recent order dispatched for `target`.
    pub fn order(&self, target: WorkTarget) -> Option<WorkOrder> {
        self.recorded
            .lock()
            .unwrap()
            .orders
            .iter()
            .rev()
            .find(|o| o.target == target)
            .cloned()
    }

    /// Poll until `count` orders have been dispatched.
    pub async fn wait_dispatched(&self, count: usize) {
        while self.dispatched().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_stopped(&self, target: WorkTarget) {
        while !self.stops().contains(&target) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Report `outcome` for the latest order of `target`, handing its input
    /// back. `stopped` mirrors whether the unit saw a stop request.
    pub async fn finish(&self, target: WorkTarget, outcome: Outcome, stopped: bool) {
        let input = self
            .order(target)
            .map(|o| o.input)
            .unwrap_or_default();
        let report = WorkReport {
            outcome,
            input,
            stopped,
            attempts: 1,
        };
        self.runtime_tx
            .send(RuntimeEvent::Engine(EngineEvent::WorkFinished { target, report }))
            .await
            .expect("runtime channel closed");
    }
}

impl ExecutorBackend for ManualExecutor {
    fn dispatch(
        &mut self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let recorded = Arc::clone(&self.recorded);
        Box::pin(async move {
            recorded
                .lock()
                .map_err(|_| ChainworkError::EngineStopped)?
                .orders
                .push(order);
            Ok(())
        })
    }

    fn stop(&mut self, target: WorkTarget) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let recorded = Arc::clone(&self.recorded);
        Box::pin(async move {
            recorded
                .lock()
                .map_err(|_| ChainworkError::EngineStopped)?
                .stops
                .push(target);
            Ok(())
        })
    }
}
