// src/engine/core.rs

//! Pure core engine state machine.
//!
//! This module contains a synchronous, deterministic "core" that consumes
//! [`EngineEvent`]s at a given instant and produces:
//! - an updated core state
//! - the status transitions to publish
//! - a list of commands describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending work orders and stop requests to the executor
//! - sleeping until the next deadline
//! - publishing transitions
//!
//! The core is intended to be extensively unit tested without Tokio tasks,
//! channels or processes; time is passed in explicitly.

use tokio::time::Instant;
use tracing::debug;

use crate::chain::ChainBook;
use crate::constraints::Environment;
use crate::engine::event_handlers::{
    handle_cancel_all_jobs, handle_cancel_chain, handle_cancel_job, handle_deadline_tick,
    handle_environment_change, handle_shutdown, handle_submit_chain, handle_submit_job,
    handle_work_finished, CoreStep,
};
use crate::engine::{EngineEvent, EngineOptions, Reply};
use crate::jobs::JobTable;
use crate::status::{EntityId, EntityState};

/// Pure core engine state.
///
/// This owns:
/// - the job table (with the constraint wait set)
/// - the chain book (with the unique-work registry)
/// - the last environment reported by the platform feed
/// - engine options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio tasks, and does not perform any IO.
#[derive(Debug)]
pub struct EngineCore {
    jobs: JobTable,
    chains: ChainBook,
    environment: Environment,
    options: EngineOptions,
}

impl EngineCore {
    pub fn new(environment: Environment, options: EngineOptions) -> Self {
        Self {
            jobs: JobTable::new(),
            chains: ChainBook::new(),
            environment,
            options,
        }
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn chains(&self) -> &ChainBook {
        &self.chains
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// No job or chain is pending, queued or running.
    pub fn is_idle(&self) -> bool {
        self.jobs.live_count() == 0 && self.chains.live_count() == 0
    }

    /// Point query; `None` for unknown or evicted ids.
    pub fn status_of(&self, id: EntityId) -> Option<EntityState> {
        match id {
            EntityId::Job(id) => self.jobs.state_of(id).map(EntityState::Job),
            EntityId::Chain(id) => self.chains.state_of(id).map(EntityState::Chain),
        }
    }

    /// At most one running chain per unique name.
    pub fn registry_consistent(&self) -> bool {
        self.chains.registry_consistent()
    }

    /// Earliest instant at which a [`EngineEvent::DeadlineTick`] has
    /// something to do: an override deadline or a retention eviction.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let retention = self.options.retention;
        [
            self.jobs.next_deadline(),
            self.jobs.next_eviction(retention),
            self.chains.next_eviction(retention),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Handle a single event at `now`, updating core state and returning the
    /// resulting commands and transitions for the IO shell.
    pub fn step(&mut self, event: EngineEvent, now: Instant) -> CoreStep {
        // Only events that can make the engine idle may end a `--once` run.
        let may_exit = matches!(
            event,
            EngineEvent::WorkFinished { .. }
                | EngineEvent::CancelAllJobs
                | EngineEvent::CancelJob(_)
                | EngineEvent::CancelChain(_)
                | EngineEvent::DeadlineTick
        );

        let mut step = match event {
            EngineEvent::SubmitJob(request) => {
                handle_submit_job(&mut self.jobs, &self.environment, request, now)
            }
            EngineEvent::CancelAllJobs => handle_cancel_all_jobs(&mut self.jobs, now),
            EngineEvent::CancelJob(id) => handle_cancel_job(&mut self.jobs, id, now),
            EngineEvent::SubmitChain(request) => {
                handle_submit_chain(&mut self.chains, request, now)
            }
            EngineEvent::CancelChain(name) => handle_cancel_chain(&mut self.chains, &name, now),
            EngineEvent::EnvironmentChanged(update) => {
                handle_environment_change(&mut self.jobs, &mut self.environment, update, now)
            }
            EngineEvent::DeadlineTick => {
                let step = handle_deadline_tick(&mut self.jobs, &self.environment, now);
                self.evict(now);
                step
            }
            EngineEvent::WorkFinished { target, report } => handle_work_finished(
                &mut self.jobs,
                &mut self.chains,
                &self.environment,
                target,
                report,
                now,
            ),
            EngineEvent::QueryStatus(id) => {
                let mut step = CoreStep::new();
                step.reply(Reply::Status(self.status_of(id)));
                step
            }
            EngineEvent::ShutdownRequested => handle_shutdown(&mut self.jobs, &mut self.chains, now),
        };

        debug_assert!(
            self.registry_consistent(),
            "more than one running chain under a unique name"
        );

        if may_exit && step.keep_running && self.options.exit_when_idle && self.is_idle() {
            debug!("engine idle; requesting exit");
            step.request_exit();
        }

        step
    }

    fn evict(&mut self, now: Instant) {
        let retention = self.options.retention;
        self.jobs.evict_expired(now, retention);
        self.chains.evict_expired(now, retention);
    }
}
