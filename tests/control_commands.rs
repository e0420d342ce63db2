use chainwork::chain::ChainId;
use chainwork::constraints::Environment;
use chainwork::control::{ControlCommand, EnvChange};
use chainwork::jobs::JobId;
use chainwork::status::EntityId;
use chainwork::types::NetworkClass;

#[test]
fn submission_and_cancel_commands_parse() {
    assert_eq!(
        "job notify".parse::<ControlCommand>(),
        Ok(ControlCommand::Job("notify".to_string()))
    );
    assert_eq!(
        "  chain   pipeline-a ".parse::<ControlCommand>(),
        Ok(ControlCommand::Chain("pipeline-a".to_string()))
    );
    assert_eq!(
        "cancel-jobs".parse::<ControlCommand>(),
        Ok(ControlCommand::CancelJobs)
    );
    assert_eq!(
        "cancel-job job-3".parse::<ControlCommand>(),
        Ok(ControlCommand::CancelJob(JobId(3)))
    );
    assert_eq!(
        "cancel-job 3".parse::<ControlCommand>(),
        Ok(ControlCommand::CancelJob(JobId(3)))
    );
    assert_eq!(
        "cancel-chain pipeline-a".parse::<ControlCommand>(),
        Ok(ControlCommand::CancelChain("pipeline-a".to_string()))
    );
    assert_eq!(
        "status chain-2".parse::<ControlCommand>(),
        Ok(ControlCommand::Status(EntityId::Chain(ChainId(2))))
    );
    assert_eq!("quit".parse::<ControlCommand>(), Ok(ControlCommand::Quit));
    assert_eq!("exit".parse::<ControlCommand>(), Ok(ControlCommand::Quit));
}

#[test]
fn malformed_commands_are_rejected_with_a_reason() {
    let err = "job".parse::<ControlCommand>().unwrap_err();
    assert!(err.contains("job name"), "{err}");

    let err = "launch rockets".parse::<ControlCommand>().unwrap_err();
    assert!(err.contains("unknown command"), "{err}");

    assert!("".parse::<ControlCommand>().is_err());
    assert!("cancel-job soon".parse::<ControlCommand>().is_err());
    assert!("status 7".parse::<ControlCommand>().is_err());
}

#[test]
fn env_command_only_changes_the_given_fields() {
    let command = "env network=unmetered charging=on".parse::<ControlCommand>();
    let change = match command {
        Ok(ControlCommand::Env(change)) => change,
        other => panic!("expected Env, got {other:?}"),
    };

    let before = Environment {
        network: NetworkClass::None,
        charging: false,
        idle: true,
    };
    assert_eq!(
        change.apply(before),
        Environment {
            network: NetworkClass::Unmetered,
            charging: true,
            idle: true,
        }
    );

    assert_eq!("".parse::<EnvChange>(), Ok(EnvChange::default()));
    assert!("idle=maybe".parse::<EnvChange>().is_err());
    assert!("volume=11".parse::<EnvChange>().is_err());
    assert!("network".parse::<EnvChange>().is_err());
}
