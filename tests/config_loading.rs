// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use chainwork::config::{load_and_validate, load_from_path, ConfigFile};
use chainwork::errors::ChainworkError;
use chainwork::types::{ConflictPolicy, NetworkClass};
use chainwork::work::Data;
use chainwork_test_utils::builders::{ChainConfigBuilder, ConfigFileBuilder, JobConfigBuilder};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_loads_with_defaults_applied() {
    let file = write_config(
        r#"
[environment]
network = "any"

[job.notify]
cmd = "echo notify"
network = "unmetered"
deadline_secs = 10
tags = ["net"]
payload = { uri = "a", size = 3 }

[chain.blur]
policy = "append"
seed = { uri = "image.png" }

[[chain.blur.stage]]
name = "cleanup"
cmd = "true"

[[chain.blur.stage]]
name = "blur"
cmd = "true"
tags = ["image"]
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid config");

    assert_eq!(cfg.engine.workers, 2);
    assert_eq!(cfg.engine.retention_secs, 300);
    assert_eq!(cfg.initial_environment().network, NetworkClass::Any);
    assert_eq!(cfg.pool_options().retry_backoff, Duration::from_millis(1000));
    assert!(!cfg.engine_options(false).exit_when_idle);

    let job = cfg.job_request("notify").expect("job declared");
    assert_eq!(job.unit.name(), "notify");
    assert_eq!(job.constraints.network, NetworkClass::Unmetered);
    assert_eq!(job.constraints.override_deadline, Some(Duration::from_secs(10)));
    assert!(job.tags.contains("net"));
    assert_eq!(job.payload, Data::new().with("uri", "a").with("size", 3));

    let chain = cfg.chain_request("blur").expect("chain declared");
    assert_eq!(chain.name, "blur");
    assert_eq!(chain.policy, ConflictPolicy::Append);
    assert_eq!(chain.seed, Data::new().with("uri", "image.png"));
    let names: Vec<&str> = chain.stages.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["cleanup", "blur"]);
    assert!(chain.stages[1].tags().contains("image"));

    assert!(cfg.job_request("missing").is_none());
    assert!(cfg.chain_request("missing").is_none());
}

#[test]
fn job_without_constraints_is_a_config_error() {
    let file = write_config(
        r#"
[job.anytime]
cmd = "echo hi"
"#,
    );

    match load_and_validate(file.path()) {
        Err(ChainworkError::ConfigError(msg)) => {
            assert!(msg.contains("anytime"));
            assert!(msg.contains("please set at least one constraint"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn chain_without_stages_is_a_config_error() {
    let file = write_config(
        r#"
[chain.empty]
policy = "keep"
"#,
    );

    match load_and_validate(file.path()) {
        Err(ChainworkError::ConfigError(msg)) => {
            assert!(msg.contains("chain 'empty'"));
            assert!(msg.contains("at least one"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn config_without_work_is_rejected() {
    let file = write_config(
        r#"
[engine]
workers = 4
"#,
    );

    // Parsing alone succeeds; validation does not.
    let raw = load_from_path(file.path()).expect("parses");
    assert_eq!(raw.engine.workers, 4);

    match ConfigFile::try_from(raw) {
        Err(ChainworkError::ConfigError(msg)) => assert!(msg.contains("at least one")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn unknown_policy_is_a_toml_error() {
    let file = write_config(
        r#"
[chain.blur]
policy = "sometimes"

[[chain.blur.stage]]
name = "blur"
cmd = "true"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ChainworkError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Chainwork.toml");

    assert!(matches!(
        load_and_validate(&path),
        Err(ChainworkError::IoError(_))
    ));
}

#[test]
fn builders_produce_configs_that_validate_like_files() {
    let cfg = ConfigFileBuilder::new()
        .with_job(
            "sync",
            JobConfigBuilder::new("echo sync")
                .requires_charging(true)
                .tag("power")
                .build(),
        )
        .with_chain(
            "pipeline-a",
            ChainConfigBuilder::new(ConflictPolicy::Replace)
                .stage("s1", "true")
                .tagged_stage("s2", "true", "net")
                .build(),
        )
        .build();

    let job = cfg.job_request("sync").expect("declared");
    assert!(job.constraints.requires_charging);
    assert_eq!(cfg.chain_request("pipeline-a").map(|c| c.stages.len()), Some(2));

    let zero_workers = ConfigFileBuilder::new()
        .with_workers(0)
        .with_job("sync", JobConfigBuilder::new("true").requires_idle(true).build())
        .raw();
    assert!(matches!(
        ConfigFile::try_from(zero_workers),
        Err(ChainworkError::ConfigError(_))
    ));

    let blank_stage = ConfigFileBuilder::new()
        .with_chain(
            "pipeline-a",
            ChainConfigBuilder::new(ConflictPolicy::Keep).stage("s1", "  ").build(),
        )
        .raw();
    match ConfigFile::try_from(blank_stage) {
        Err(ChainworkError::ConfigError(msg)) => assert!(msg.contains("empty `cmd`")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}
