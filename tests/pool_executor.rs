// tests/pool_executor.rs

mod common;
use crate::common::{environment, init_tracing, network, wait_for, wait_for_state, with_timeout};

use std::collections::HashSet;
use std::error::Error;
use std::time::Duration;

use chainwork::chain::{ChainRequest, ChainState};
use chainwork::engine::EngineOptions;
use chainwork::exec::{PoolExecutor, PoolOptions};
use chainwork::jobs::{JobRequest, JobState};
use chainwork::status::{EntityState, StatusDetail, StatusFilter};
use chainwork::types::{ConflictPolicy, NetworkClass};
use chainwork::work::{Data, Outcome};
use chainwork_test_utils::units::{call_log, call_names, calls, gated, panicking, recording, scripted};
use chainwork_test_utils::{spawn_engine, TestEngine};

type TestResult = Result<(), Box<dyn Error>>;

fn pool_engine(net: NetworkClass, workers: usize) -> TestEngine {
    let options = PoolOptions {
        workers,
        retry_backoff: Duration::from_millis(10),
    };
    spawn_engine(environment(net), EngineOptions::default(), move |tx| {
        PoolExecutor::new(tx, options)
    })
}

#[tokio::test]
async fn pool_runs_chain_stages_in_order() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::None, 2);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let log = call_log();

    let request = ChainRequest::new(
        "pipeline-a",
        ConflictPolicy::Replace,
        vec![
            recording("s1", &log),
            recording("s2", &log),
            recording("s3", &log),
        ],
    )
    .with_seed(Data::new().with("uri", "a"));
    let id = scheduler
        .submit_chain(request)
        .await?
        .id()
        .ok_or("chain not started")?;

    let done = with_timeout(wait_for_state(
        &mut feed,
        id,
        EntityState::Chain(ChainState::Completed),
    ))
    .await;
    assert_eq!(
        done.detail,
        StatusDetail::Output(Data::new().with("uri", "a").with("last", "s3"))
    );
    assert_eq!(call_names(&log), vec!["s1", "s2", "s3"]);
    assert_eq!(calls(&log)[1].1.get_str("last"), Some("s1"));

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn running_unit_sees_stop_request_and_job_is_rescheduled() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::Unmetered, 2);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let (unit, gate) = gated("upload", Outcome::Retry);

    let id = scheduler
        .submit_job(JobRequest::new(unit, network(NetworkClass::Unmetered)))
        .await?;
    with_timeout(gate.wait_started(1)).await;
    with_timeout(wait_for_state(&mut feed, id, EntityState::Job(JobState::Running))).await;

    scheduler
        .update_environment(environment(NetworkClass::None))
        .await?;
    with_timeout(gate.wait_stop_seen(1)).await;
    with_timeout(wait_for_state(&mut feed, id, EntityState::Job(JobState::Pending))).await;

    scheduler
        .update_environment(environment(NetworkClass::Unmetered))
        .await?;
    with_timeout(gate.wait_started(2)).await;
    gate.release(Outcome::success(Data::new().with("done", true)));

    let event = with_timeout(wait_for_state(
        &mut feed,
        id,
        EntityState::Job(JobState::Succeeded),
    ))
    .await;
    assert_eq!(
        event.detail,
        StatusDetail::Output(Data::new().with("done", true))
    );
    assert_eq!(gate.stop_seen(), 1);

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn retrying_unit_is_invoked_until_it_succeeds() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::Any, 2);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let log = call_log();
    let unit = scripted(
        "flaky",
        vec![
            Outcome::Retry,
            Outcome::Retry,
            Outcome::success(Data::new().with("n", 3)),
        ],
        &log,
    );

    let id = scheduler
        .submit_job(JobRequest::new(unit, network(NetworkClass::Any)))
        .await?;
    with_timeout(wait_for_state(
        &mut feed,
        id,
        EntityState::Job(JobState::Succeeded),
    ))
    .await;
    assert_eq!(calls(&log).len(), 3);

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn panicking_unit_fails_its_job() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::Any, 1);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);

    let id = scheduler
        .submit_job(JobRequest::new(panicking("boom"), network(NetworkClass::Any)))
        .await?;
    let event = with_timeout(wait_for_state(&mut feed, id, EntityState::Job(JobState::Failed))).await;
    let summary = event.detail.summary().unwrap_or_default();
    assert!(summary.contains("panicked"), "unexpected detail: {summary}");

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn pool_never_runs_more_units_than_it_has_workers() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::Any, 1);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let (first, first_gate) = gated("first", Outcome::Retry);
    let (second, second_gate) = gated("second", Outcome::Retry);

    scheduler
        .submit_job(JobRequest::new(first, network(NetworkClass::Any)))
        .await?;
    scheduler
        .submit_job(JobRequest::new(second, network(NetworkClass::Any)))
        .await?;

    with_timeout(async {
        while first_gate.started() + second_gate.started() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first_gate.started() + second_gate.started(), 1);

    first_gate.release(Outcome::success(Data::new()));
    second_gate.release(Outcome::success(Data::new()));

    let mut finished = HashSet::new();
    while finished.len() < 2 {
        let event = with_timeout(wait_for(&mut feed, |e| e.state.is_terminal())).await;
        assert_eq!(event.state, EntityState::Job(JobState::Succeeded));
        finished.insert(event.entity);
    }

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn cancel_chain_stops_the_running_stage() -> TestResult {
    init_tracing();

    let engine = pool_engine(NetworkClass::None, 2);
    let scheduler = engine.scheduler.clone();
    let mut feed = scheduler.subscribe(StatusFilter::All);
    let (unit, gate) = gated("blur", Outcome::Retry);

    let id = scheduler
        .submit_chain(ChainRequest::new(
            "pipeline-a",
            ConflictPolicy::Replace,
            vec![unit],
        ))
        .await?
        .id()
        .ok_or("chain not started")?;
    with_timeout(gate.wait_started(1)).await;

    assert_eq!(scheduler.cancel_chain("pipeline-a").await?, 1);
    with_timeout(wait_for_state(
        &mut feed,
        id,
        EntityState::Chain(ChainState::Cancelled),
    ))
    .await;
    with_timeout(gate.wait_stop_seen(1)).await;

    scheduler.shutdown().await?;
    with_timeout(engine.runtime).await??;
    Ok(())
}
