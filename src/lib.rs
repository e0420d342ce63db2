// src/lib.rs

pub mod chain;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod control;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod jobs;
pub mod logging;
pub mod status;
pub mod types;
pub mod work;

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::BufRead;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chain::ChainId;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::constraints::Environment;
use crate::control::ControlCommand;
use crate::engine::{EngineCore, EngineEvent, Runtime, RuntimeEvent, Scheduler};
use crate::errors::ChainworkError;
use crate::exec::PoolExecutor;
use crate::jobs::JobId;
use crate::status::{EntityId, JsonLinesSink, StatusFilter, StatusStream};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - engine core / runtime / scheduler handle
/// - pool executor
/// - status printing and the optional journal sink
/// - stdin control commands (or a one-shot submission with `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(cfg.engine.channel_capacity);

    let status = StatusStream::new();
    let executor = PoolExecutor::new(rt_tx.clone(), cfg.pool_options());
    // `--once` waits for its own submissions instead of exiting on idle, so an
    // early finisher cannot stop the engine before everything is submitted.
    let core = EngineCore::new(cfg.initial_environment(), cfg.engine_options(false));

    let mut runtime = Runtime::new(core, rt_rx, executor, status.clone());
    if let Some(path) = &args.journal {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening journal '{path}'"))?;
        runtime = runtime.with_sink(Box::new(JsonLinesSink::new(file)));
    }

    let scheduler = Scheduler::new(rt_tx.clone(), status);

    // Status events go to stdout, one line each.
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let printer = tokio::spawn(async move {
        while let Some(event) = feed.recv().await {
            println!("{event}");
        }
    });

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(EngineEvent::ShutdownRequested.into()).await;
        });
    }
    drop(rt_tx);

    let runtime_task = tokio::spawn(runtime.run());

    if args.once {
        run_once(&scheduler, &cfg).await?;
    } else {
        tokio::spawn(control_loop(scheduler.clone(), cfg.clone()));
    }

    runtime_task.await.context("runtime task panicked")??;
    if printer.await.is_err() {
        warn!("status printer panicked");
    }
    Ok(())
}

/// Submit every declared job and chain, wait until each accepted one has
/// reached a terminal state, then shut the engine down.
async fn run_once(scheduler: &Scheduler, cfg: &ConfigFile) -> Result<()> {
    // Subscribe first so no terminal event can slip by.
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let mut outstanding: HashSet<EntityId> = HashSet::new();

    for name in cfg.job.keys() {
        outstanding.insert(submit_job(scheduler, cfg, name).await?.into());
    }
    for name in cfg.chain.keys() {
        if let Some(id) = submit_chain(scheduler, cfg, name).await? {
            outstanding.insert(id.into());
        }
    }

    while !outstanding.is_empty() {
        let Some(event) = feed.recv().await else {
            break;
        };
        if event.state.is_terminal() {
            outstanding.remove(&event.entity);
        }
    }

    info!("all submitted work finished");
    scheduler.shutdown().await?;
    Ok(())
}

async fn submit_job(
    scheduler: &Scheduler,
    cfg: &ConfigFile,
    name: &str,
) -> std::result::Result<JobId, ChainworkError> {
    let request = cfg
        .job_request(name)
        .ok_or_else(|| ChainworkError::UnknownWork(format!("job '{name}'")))?;
    let id = scheduler.submit_job(request).await?;
    info!(job = %id, %name, "submitted job");
    Ok(id)
}

async fn submit_chain(
    scheduler: &Scheduler,
    cfg: &ConfigFile,
    name: &str,
) -> std::result::Result<Option<ChainId>, ChainworkError> {
    let request = cfg
        .chain_request(name)
        .ok_or_else(|| ChainworkError::UnknownWork(format!("chain '{name}'")))?;
    let submission = scheduler.submit_chain(request).await?;
    if submission.is_ignored() {
        println!("chain '{name}' is already active; submission ignored");
    }
    info!(%name, ?submission, "submitted chain");
    Ok(submission.id())
}

/// Read control commands from stdin until `quit` or end of input, then shut
/// the engine down.
async fn control_loop(scheduler: Scheduler, cfg: ConfigFile) {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);

    // Blocking stdin reads stay off the runtime threads.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut environment = cfg.initial_environment();

    while let Some(line) = line_rx.recv().await {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let command = match line.parse::<ControlCommand>() {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        if command == ControlCommand::Quit {
            break;
        }

        match execute_control(&scheduler, &cfg, &mut environment, command).await {
            Ok(()) => {}
            Err(ChainworkError::EngineStopped) => {
                debug!("engine stopped; leaving control loop");
                return;
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }

    if let Err(err) = scheduler.shutdown().await {
        debug!(error = %err, "shutdown after end of input");
    }
}

async fn execute_control(
    scheduler: &Scheduler,
    cfg: &ConfigFile,
    environment: &mut Environment,
    command: ControlCommand,
) -> std::result::Result<(), ChainworkError> {
    match command {
        ControlCommand::Job(name) => {
            let id = submit_job(scheduler, cfg, &name).await?;
            println!("{id} submitted");
        }
        ControlCommand::Chain(name) => {
            if let Some(id) = submit_chain(scheduler, cfg, &name).await? {
                println!("{id} submitted");
            }
        }
        ControlCommand::Env(change) => {
            *environment = change.apply(*environment);
            scheduler.update_environment(*environment).await?;
        }
        ControlCommand::CancelJobs => {
            let count = scheduler.cancel_all_jobs().await?;
            println!("cancelled {count} job(s)");
        }
        ControlCommand::CancelJob(id) => {
            let count = scheduler.cancel_job(id).await?;
            println!("cancelled {count} job(s)");
        }
        ControlCommand::CancelChain(name) => {
            let count = scheduler.cancel_chain(name.as_str()).await?;
            println!("cancelled {count} chain(s) named '{name}'");
        }
        ControlCommand::Status(id) => match scheduler.status_of(id).await? {
            Some(state) => println!("{id}: {state}"),
            None => println!("{id}: unknown"),
        },
        ControlCommand::Quit => {}
    }
    Ok(())
}

/// Simple dry-run output: print jobs, chains and their commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("chainwork dry-run");
    println!("  engine.workers = {}", cfg.engine.workers);
    println!("  engine.retry_backoff_ms = {}", cfg.engine.retry_backoff_ms);
    println!("  engine.retention_secs = {}", cfg.engine.retention_secs);
    println!(
        "  environment = network:{} charging:{} idle:{}",
        cfg.environment.network, cfg.environment.charging, cfg.environment.idle
    );
    println!();

    println!("jobs ({}):", cfg.job.len());
    for (name, job) in cfg.job.iter() {
        println!("  - {name}");
        println!("      cmd: {}", job.cmd);
        println!("      network: {}", job.network);
        if job.requires_charging {
            println!("      requires_charging: true");
        }
        if job.requires_idle {
            println!("      requires_idle: true");
        }
        if let Some(secs) = job.deadline_secs {
            println!("      deadline_secs: {secs}");
        }
        if !job.tags.is_empty() {
            println!("      tags: {:?}", job.tags);
        }
        if !job.payload.is_empty() {
            println!("      payload: {}", job.payload.summary());
        }
    }

    println!("chains ({}):", cfg.chain.len());
    for (name, chain) in cfg.chain.iter() {
        println!("  - {name} (policy: {})", chain.policy);
        if !chain.seed.is_empty() {
            println!("      seed: {}", chain.seed.summary());
        }
        for (index, stage) in chain.stages.iter().enumerate() {
            println!("      [{index}] {}: {}", stage.name, stage.cmd);
        }
    }

    debug!("dry-run complete (no execution)");
}
