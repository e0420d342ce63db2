// src/engine/event_handlers.rs

//! Event handling logic for the core engine.

use tokio::time::Instant;
use tracing::{debug, info};

use crate::chain::{ChainBook, ChainRequest};
use crate::constraints::Environment;
use crate::exec::{WorkOrder, WorkReport, WorkTarget};
use crate::jobs::{JobId, JobRequest, JobTable};
use crate::status::StatusUpdate;

use super::Reply;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand this order to the executor.
    Dispatch(WorkOrder),
    /// Raise the stop signal of whatever runs for this target.
    Stop(WorkTarget),
    /// Request that the runtime exits (used for `--once` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Transitions to publish, in order.
    pub updates: Vec<StatusUpdate>,
    /// Answer for the requester, if the event was a request.
    pub reply: Option<Reply>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl Default for CoreStep {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            updates: Vec::new(),
            reply: None,
            keep_running: true,
        }
    }
}

impl CoreStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, order: WorkOrder) {
        self.commands.push(CoreCommand::Dispatch(order));
    }

    pub fn stop(&mut self, target: WorkTarget) {
        self.commands.push(CoreCommand::Stop(target));
    }

    pub fn publish(&mut self, update: StatusUpdate) {
        self.updates.push(update);
    }

    pub fn reply(&mut self, reply: Reply) {
        self.reply = Some(reply);
    }

    pub fn request_exit(&mut self) {
        self.keep_running = false;
        self.commands.push(CoreCommand::RequestExit);
    }

    /// Orders dispatched by this step (handy in tests).
    pub fn dispatched(&self) -> impl Iterator<Item = &WorkOrder> {
        self.commands.iter().filter_map(|c| match c {
            CoreCommand::Dispatch(order) => Some(order),
            _ => None,
        })
    }

    /// Targets stopped by this step (handy in tests).
    pub fn stopped(&self) -> impl Iterator<Item = WorkTarget> + '_ {
        self.commands.iter().filter_map(|c| match c {
            CoreCommand::Stop(target) => Some(*target),
            _ => None,
        })
    }
}

/// Handle a job submission.
///
/// The new job is evaluated at once, so a job whose constraints already hold
/// starts in the same step.
pub fn handle_submit_job(
    jobs: &mut JobTable,
    environment: &Environment,
    request: JobRequest,
    now: Instant,
) -> CoreStep {
    let mut step = CoreStep::new();

    match jobs.admit(request, now) {
        Ok((id, update)) => {
            step.publish(update);
            sweep_wait_set(jobs, environment, now, &mut step);
            step.reply(Reply::Job(Ok(id)));
        }
        Err(err) => step.reply(Reply::Job(Err(err))),
    }

    step
}

/// Handle a new environment snapshot from the platform feed.
///
/// - Running jobs whose constraints no longer hold get their stop signal
///   raised; their own report decides what happens next.
/// - Waiting jobs whose constraints now hold are dispatched.
pub fn handle_environment_change(
    jobs: &mut JobTable,
    environment: &mut Environment,
    update: Environment,
    now: Instant,
) -> CoreStep {
    let mut step = CoreStep::new();

    if *environment != update {
        info!(
            network = %update.network,
            charging = update.charging,
            idle = update.idle,
            "environment changed"
        );
    }
    *environment = update;

    let snapshot = environment.at(now);
    for id in jobs.halt_candidates(&snapshot) {
        if jobs.request_halt(id) {
            info!(job = %id, "constraints no longer met; asking running job to stop");
            step.stop(WorkTarget::Job(id));
        }
    }

    sweep_wait_set(jobs, environment, now, &mut step);
    step.reply(Reply::Ack);
    step
}

/// Handle a deadline tick: fire expired override deadlines.
pub fn handle_deadline_tick(
    jobs: &mut JobTable,
    environment: &Environment,
    now: Instant,
) -> CoreStep {
    let mut step = CoreStep::new();
    sweep_wait_set(jobs, environment, now, &mut step);
    step.reply(Reply::Ack);
    step
}

/// Handle a report from the executor.
pub fn handle_work_finished(
    jobs: &mut JobTable,
    chains: &mut ChainBook,
    environment: &Environment,
    target: WorkTarget,
    report: WorkReport,
    now: Instant,
) -> CoreStep {
    let mut step = CoreStep::new();

    match target {
        WorkTarget::Job(id) => {
            if let Some(update) = jobs.finish(id, report, now) {
                step.publish(update);
            }
            // A rescheduled job may be runnable straight away.
            if jobs.is_waiting(id) {
                sweep_wait_set(jobs, environment, now, &mut step);
            }
        }
        WorkTarget::Stage { chain, index } => {
            chains.stage_finished(chain, index, report, now, &mut step);
        }
    }

    step
}

/// Handle `cancel_all_jobs`.
pub fn handle_cancel_all_jobs(jobs: &mut JobTable, now: Instant) -> CoreStep {
    let mut step = CoreStep::new();

    let cancelled = jobs.cancel_all(now);
    let count = cancelled.len();
    for (update, stop) in cancelled {
        step.publish(update);
        if let Some(target) = stop {
            step.stop(target);
        }
    }

    if count == 0 {
        debug!("cancel all jobs: nothing scheduled");
    } else {
        info!(count, "cancelled all jobs");
    }
    step.reply(Reply::Cancelled(count));
    step
}

/// Handle `cancel_job`.
pub fn handle_cancel_job(jobs: &mut JobTable, id: JobId, now: Instant) -> CoreStep {
    let mut step = CoreStep::new();

    let count = match jobs.cancel(id, now) {
        Some((update, stop)) => {
            step.publish(update);
            if let Some(target) = stop {
                step.stop(target);
            }
            1
        }
        None => {
            debug!(job = %id, "cancel: job unknown or already finished");
            0
        }
    };

    step.reply(Reply::Cancelled(count));
    step
}

/// Handle a chain submission.
pub fn handle_submit_chain(chains: &mut ChainBook, request: ChainRequest, now: Instant) -> CoreStep {
    let mut step = CoreStep::new();
    let result = chains.submit(request, now, &mut step);
    step.reply(Reply::Chain(result));
    step
}

/// Handle `cancel_chain(name)`.
pub fn handle_cancel_chain(chains: &mut ChainBook, name: &str, now: Instant) -> CoreStep {
    let mut step = CoreStep::new();
    let count = chains.cancel_name(name, now, &mut step);
    if count == 0 {
        debug!(%name, "cancel chain: nothing live under this name");
    }
    step.reply(Reply::Cancelled(count));
    step
}

/// Handle shutdown: cancel everything that is still live and stop.
pub fn handle_shutdown(jobs: &mut JobTable, chains: &mut ChainBook, now: Instant) -> CoreStep {
    let mut step = handle_cancel_all_jobs(jobs, now);
    let chains_cancelled = chains.cancel_all(now, &mut step);

    info!(chains_cancelled, "shutdown requested");
    step.reply(Reply::Ack);
    step.keep_running = false;
    step
}

/// Dispatch every waiting job whose constraints hold right now.
fn sweep_wait_set(jobs: &mut JobTable, environment: &Environment, now: Instant, step: &mut CoreStep) {
    let snapshot = environment.at(now);
    for (id, verdict) in jobs.ready(&snapshot) {
        if let Some((order, update)) = jobs.start(id) {
            info!(job = %id, ?verdict, unit = %order.unit.name(), "job ready; dispatching");
            step.publish(update);
            step.dispatch(order);
        }
    }
}
