// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::status::{StatusStream, StatusUpdate, TransitionRecord, TransitionSink};

use super::core::EngineCore;
use super::{CoreCommand, CoreStep, EngineEvent, Reply, RuntimeEvent};

/// Drives the [`EngineCore`] in response to `RuntimeEvent`s and deadline
/// timers, and delegates actual execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around the core, which contains all the engine
/// semantics. This struct handles async IO: reading events from channels,
/// sleeping until the next deadline, publishing transitions and dispatching
/// work to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: EngineCore,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    status: StatusStream,
    sink: Option<Box<dyn TransitionSink>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("status", &self.status)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: EngineCore,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        status: StatusStream,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            status,
            sink: None,
        }
    }

    /// Offer every transition to `sink` as well.
    pub fn with_sink(mut self, sink: Box<dyn TransitionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Injects a `DeadlineTick` when the core's next wake-up instant passes.
    /// - Feeds events into the core, publishes the resulting transitions,
    ///   answers requests and executes commands.
    ///
    /// The status stream is closed on exit.
    pub async fn run(mut self) -> Result<()> {
        info!("chainwork runtime started");

        let result = self.event_loop().await;

        self.status.close();
        info!("runtime exiting");
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let wakeup = self.core.next_wakeup();

            let runtime_event = tokio::select! {
                received = self.event_rx.recv() => match received {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        return Ok(());
                    }
                },
                _ = sleep_until(wakeup) => RuntimeEvent::Engine(EngineEvent::DeadlineTick),
            };

            let (event, reply_tx) = match runtime_event {
                RuntimeEvent::Engine(event) => (event, None),
                RuntimeEvent::Request { event, reply } => (event, Some(reply)),
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and get commands back.
            let CoreStep {
                commands,
                updates,
                reply,
                keep_running,
            } = self.core.step(event, Instant::now());

            for update in updates {
                self.publish(update);
            }

            if let Some(reply_tx) = reply_tx {
                if reply_tx.send(reply.unwrap_or(Reply::Ack)).is_err() {
                    debug!("requester went away before the reply was sent");
                }
            }

            for command in commands {
                self.execute_command(command).await?;
            }

            if !keep_running {
                info!("core requested exit; stopping runtime");
                return Ok(());
            }
        }
    }

    fn publish(&mut self, update: StatusUpdate) {
        let event = self.status.publish(update);
        info!(
            entity = %event.entity,
            name = event.name.as_deref().unwrap_or(""),
            state = %event.state,
            detail = %event.detail.summary().unwrap_or_default(),
            "status"
        );

        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.offer(&TransitionRecord::from(&event)) {
                warn!(entity = %event.entity, error = %err, "transition sink rejected a record");
            }
        }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(order) => {
                debug!(work = %order.target, unit = %order.unit.name(), "dispatching order");
                self.executor.dispatch(order).await?;
            }
            CoreCommand::Stop(target) => {
                debug!(work = %target, "requesting stop");
                self.executor.stop(target).await?;
            }
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false in this case.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
