use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use chainwork::chain::{ChainId, ChainRequest, ChainState};
use chainwork::constraints::{ConstraintSet, Environment};
use chainwork::engine::{EngineCore, EngineEvent, EngineOptions, Reply};
use chainwork::exec::{WorkReport, WorkTarget};
use chainwork::jobs::{JobRequest, JobState};
use chainwork::status::{EntityId, EntityState};
use chainwork::types::{ConflictPolicy, NetworkClass};
use chainwork::work::{Data, Outcome, WorkUnit};
use chainwork_test_utils::units::pass_through;

const NAMES: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
    Submit { name: usize, policy: ConflictPolicy },
    Finish { pick: usize, fail: bool },
    Cancel { name: usize },
}

fn policy_strategy() -> impl Strategy<Value = ConflictPolicy> {
    prop_oneof![
        Just(ConflictPolicy::Replace),
        Just(ConflictPolicy::Keep),
        Just(ConflictPolicy::Append),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NAMES.len(), policy_strategy())
            .prop_map(|(name, policy)| Op::Submit { name, policy }),
        4 => (any::<usize>(), any::<bool>()).prop_map(|(pick, fail)| Op::Finish { pick, fail }),
        1 => (0..NAMES.len()).prop_map(|name| Op::Cancel { name }),
    ]
}

fn two_stages() -> Vec<WorkUnit> {
    vec![pass_through("first"), pass_through("second")]
}

fn finished(target: WorkTarget, outcome: Outcome, input: Data) -> EngineEvent {
    EngineEvent::WorkFinished {
        target,
        report: WorkReport::new(outcome, input),
    }
}

proptest! {
    /// Stage i gets stage i-1's output (the seed for stage 0), stages run in
    /// order and never two at once.
    #[test]
    fn stages_run_in_order_and_thread_their_data(
        outputs in proptest::collection::vec(any::<u32>(), 1..8),
        seed in any::<u32>(),
    ) {
        let mut core = EngineCore::new(Environment::default(), EngineOptions::default());
        let now = Instant::now();
        let units: Vec<WorkUnit> = (0..outputs.len())
            .map(|i| pass_through(&format!("stage-{i}")))
            .collect();
        let request = ChainRequest::new("pipeline", ConflictPolicy::Replace, units)
            .with_seed(Data::new().with("v", seed));

        let mut step = core.step(EngineEvent::SubmitChain(request), now);
        let mut expected_input = Data::new().with("v", seed);

        for (index, value) in outputs.iter().enumerate() {
            let orders: Vec<_> = step.dispatched().cloned().collect();
            prop_assert_eq!(orders.len(), 1);
            let order = &orders[0];
            let chain = ChainId(1);
            prop_assert_eq!(order.target, WorkTarget::Stage { chain, index });
            prop_assert_eq!(&order.input, &expected_input);

            let output = Data::new().with("v", *value);
            step = core.step(
                finished(order.target, Outcome::success(output.clone()), order.input.clone()),
                now,
            );
            expected_input = output;
        }

        prop_assert_eq!(step.dispatched().count(), 0);
        prop_assert_eq!(
            core.status_of(EntityId::Chain(ChainId(1))),
            Some(EntityState::Chain(ChainState::Completed))
        );
    }

    /// Whatever the sequence of submissions, reports and cancellations, each
    /// name has at most one running instance and the registry only points at
    /// live ones.
    #[test]
    fn registry_never_holds_two_running_instances(
        ops in proptest::collection::vec(op_strategy(), 1..60),
    ) {
        let mut core = EngineCore::new(Environment::default(), EngineOptions::default());
        let now = Instant::now();
        let mut outstanding: Vec<(WorkTarget, Data)> = Vec::new();
        let mut max_id = 0;

        for op in ops {
            let step = match op {
                Op::Submit { name, policy } => {
                    let request = ChainRequest::new(NAMES[name], policy, two_stages());
                    let step = core.step(EngineEvent::SubmitChain(request), now);
                    if let Some(Reply::Chain(Ok(submission))) = &step.reply {
                        if submission.is_ignored() {
                            prop_assert_eq!(step.dispatched().count(), 0);
                            prop_assert!(step.updates.is_empty());
                        }
                        if let Some(id) = submission.id() {
                            max_id = max_id.max(id.0);
                        }
                    }
                    step
                }
                Op::Finish { pick, fail } => {
                    if outstanding.is_empty() {
                        continue;
                    }
                    let (target, input) = outstanding.remove(pick % outstanding.len());
                    let outcome = if fail {
                        Outcome::failure("scripted")
                    } else {
                        Outcome::success(input.clone())
                    };
                    core.step(finished(target, outcome, input), now)
                }
                Op::Cancel { name } => {
                    core.step(EngineEvent::CancelChain(NAMES[name].to_string()), now)
                }
            };

            outstanding.extend(step.dispatched().map(|o| (o.target, o.input.clone())));
            prop_assert!(core.registry_consistent());

            let mut running: HashMap<&str, usize> = HashMap::new();
            for id in 1..=max_id {
                if let Some(record) = core.chains().get(ChainId(id)) {
                    if record.state().is_running() {
                        *running.entry(record.name()).or_default() += 1;
                    }
                }
            }
            prop_assert!(running.values().all(|n| *n <= 1), "running per name: {:?}", running);
        }
    }

    /// A job with an override deadline never starts before it and always
    /// starts at it, whatever the other constraints say.
    #[test]
    fn override_deadline_is_honoured(
        deadline_secs in 1u64..3600,
        requires_charging in any::<bool>(),
        requires_idle in any::<bool>(),
        early in 0u64..3600,
    ) {
        let mut core = EngineCore::new(Environment::default(), EngineOptions::default());
        let t0 = Instant::now();
        let deadline = Duration::from_secs(deadline_secs);
        let constraints = ConstraintSet {
            network: NetworkClass::Unmetered,
            requires_charging,
            requires_idle,
            override_deadline: Some(deadline),
        };

        let step = core.step(
            EngineEvent::SubmitJob(JobRequest::new(pass_through("job"), constraints)),
            t0,
        );
        let id = match &step.reply {
            Some(Reply::Job(Ok(id))) => *id,
            other => panic!("expected an accepted job, got {other:?}"),
        };

        let before = t0 + Duration::from_secs(early % deadline_secs);
        let step = core.step(EngineEvent::DeadlineTick, before);
        prop_assert_eq!(step.dispatched().count(), 0);
        prop_assert_eq!(core.status_of(id.into()), Some(EntityState::Job(JobState::Pending)));

        let step = core.step(EngineEvent::DeadlineTick, t0 + deadline);
        prop_assert_eq!(step.dispatched().count(), 1);
        prop_assert_eq!(core.status_of(id.into()), Some(EntityState::Job(JobState::Running)));
    }
}
