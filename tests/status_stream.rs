use std::collections::BTreeSet;
use std::error::Error;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use chainwork::chain::{ChainId, ChainState};
use chainwork::jobs::{JobId, JobState};
use chainwork::status::{
    EntityId, EntityState, JsonLinesSink, MemorySink, StatusDetail, StatusFilter, StatusStream,
    StatusUpdate, TransitionRecord, TransitionSink,
};
use chainwork::work::Data;

type TestResult = Result<(), Box<dyn Error>>;

fn job_update(id: u64, state: JobState, tags: &[&str]) -> StatusUpdate {
    StatusUpdate {
        entity: EntityId::Job(JobId(id)),
        name: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        state: EntityState::Job(state),
        detail: StatusDetail::None,
    }
}

fn chain_update(id: u64, name: &str, state: ChainState) -> StatusUpdate {
    StatusUpdate {
        entity: EntityId::Chain(ChainId(id)),
        name: Some(name.to_string()),
        tags: BTreeSet::new(),
        state: EntityState::Chain(state),
        detail: StatusDetail::None,
    }
}

#[test]
fn subscribers_receive_only_matching_events() {
    let stream = StatusStream::new();
    let mut all = stream.subscribe(StatusFilter::All);
    let mut job = stream.subscribe(StatusFilter::Job(JobId(1)));
    let mut chain = stream.subscribe(StatusFilter::Chain(ChainId(7)));
    let mut name = stream.subscribe(StatusFilter::UniqueName("pipeline-a".to_string()));
    let mut tag = stream.subscribe(StatusFilter::Tag("net".to_string()));

    stream.publish(job_update(1, JobState::Pending, &[]));
    stream.publish(job_update(2, JobState::Pending, &["net"]));
    stream.publish(chain_update(7, "pipeline-a", ChainState::Queued));
    stream.publish(chain_update(8, "pipeline-b", ChainState::Queued));

    assert_eq!(all.drain().len(), 4);

    let job_events = job.drain();
    assert_eq!(job_events.len(), 1);
    assert_eq!(job_events[0].entity, EntityId::Job(JobId(1)));

    let chain_events = chain.drain();
    assert_eq!(chain_events.len(), 1);
    assert_eq!(chain_events[0].entity, EntityId::Chain(ChainId(7)));

    let named: Vec<EntityId> = name.drain().into_iter().map(|e| e.entity).collect();
    assert_eq!(named, vec![EntityId::Chain(ChainId(7))]);

    let tagged: Vec<EntityId> = tag.drain().into_iter().map(|e| e.entity).collect();
    assert_eq!(tagged, vec![EntityId::Job(JobId(2))]);
}

#[test]
fn dropped_subscribers_are_pruned_on_publish() {
    let stream = StatusStream::new();
    let keep = stream.subscribe(StatusFilter::All);
    let gone = stream.subscribe(StatusFilter::Job(JobId(99)));
    assert_eq!(stream.subscriber_count(), 2);

    drop(gone);
    stream.publish(job_update(1, JobState::Running, &[]));
    assert_eq!(stream.subscriber_count(), 1);
    drop(keep);
}

#[tokio::test]
async fn close_ends_subscriptions_after_buffered_events() {
    let stream = StatusStream::new();
    let mut feed = stream.subscribe(StatusFilter::All);

    stream.publish(job_update(1, JobState::Succeeded, &[]));
    stream.close();

    let event = feed.recv().await.expect("buffered event survives close");
    assert_eq!(event.state, EntityState::Job(JobState::Succeeded));
    assert!(feed.recv().await.is_none());
    assert_eq!(stream.subscriber_count(), 0);
}

#[test]
fn event_display_is_one_readable_line() {
    let mut update = chain_update(3, "pipeline-a", ChainState::Running { stage: 1 });
    update.detail = StatusDetail::Stage("s2".to_string());
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

    let line = update.stamp(at).to_string();
    assert_eq!(line, "03:04:05.000 chain-3 (pipeline-a) running(stage 1) stage s2");
}

#[test]
fn filters_can_be_built_from_entity_ids() {
    assert_eq!(
        StatusFilter::from(EntityId::Job(JobId(4))),
        StatusFilter::Job(JobId(4))
    );
    assert_eq!(
        StatusFilter::from(EntityId::Chain(ChainId(5))),
        StatusFilter::Chain(ChainId(5))
    );
    assert_eq!("job-4".parse::<EntityId>(), Ok(EntityId::Job(JobId(4))));
    assert_eq!("chain-5".parse::<EntityId>(), Ok(EntityId::Chain(ChainId(5))));
    assert!("task-1".parse::<EntityId>().is_err());
}

#[test]
fn memory_sink_clones_share_records() -> TestResult {
    let sink = MemorySink::new();
    let mut writer = sink.clone();

    let event = job_update(1, JobState::Pending, &[]).stamp(Utc::now());
    writer.offer(&TransitionRecord::from(&event))?;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, "job-1");
    assert_eq!(records[0].kind, "job");
    assert_eq!(records[0].state, "pending");
    Ok(())
}

#[test]
fn json_lines_sink_writes_one_object_per_transition() -> TestResult {
    let mut sink = JsonLinesSink::new(Vec::new());

    let pending = job_update(1, JobState::Pending, &[]).stamp(Utc::now());
    let mut done = chain_update(2, "pipeline-a", ChainState::Completed);
    done.detail = StatusDetail::Output(Data::new().with("uri", "b"));
    let done = done.stamp(Utc::now());

    sink.offer(&TransitionRecord::from(&pending))?;
    sink.offer(&TransitionRecord::from(&done))?;

    let written = String::from_utf8(sink.into_inner())?;
    let lines: Vec<Value> = written
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["entity_id"], "job-1");
    assert_eq!(lines[0]["kind"], "job");
    assert_eq!(lines[0]["state"], "pending");
    assert!(lines[0].get("payload_summary").is_none());

    assert_eq!(lines[1]["entity_id"], "chain-2");
    assert_eq!(lines[1]["kind"], "chain");
    assert_eq!(lines[1]["state"], "completed");
    assert_eq!(lines[1]["payload_summary"], "{uri=b}");
    assert!(lines[1]["timestamp"].is_string());
    Ok(())
}
