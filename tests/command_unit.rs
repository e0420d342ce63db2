#![cfg(unix)]

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use chainwork::work::command::{EXIT_RETRY, INPUT_VAR};
use chainwork::work::{command_unit, Data, Outcome, WorkContext};

fn run(cmd: &str, input: Data) -> Outcome {
    let unit = command_unit("cmd", cmd);
    let ctx = WorkContext::new(input, 1, CancellationToken::new());
    unit.run(&ctx)
}

#[test]
fn json_object_on_last_line_becomes_the_output() {
    let outcome = run(
        r#"echo "working..."; echo '{"uri":"b","size":2}'"#,
        Data::new(),
    );
    assert_eq!(
        outcome,
        Outcome::success(Data::new().with("uri", "b").with("size", 2))
    );
}

#[test]
fn silent_success_passes_the_input_through() {
    let input = Data::new().with("uri", "a");
    assert_eq!(run("true", input.clone()), Outcome::success(input));
}

#[test]
fn input_is_exported_to_the_command() {
    let input = Data::new().with("uri", "a").with("count", 2);
    let outcome = run(
        r#"printf '{"seen":"%s","count":"%s"}\n' "$CHAINWORK_URI" "$CHAINWORK_COUNT""#,
        input,
    );
    assert_eq!(
        outcome,
        Outcome::success(Data::new().with("seen", "a").with("count", "2"))
    );

    let outcome = run(r#"echo "$CHAINWORK_INPUT""#, Data::new().with("k", "v"));
    assert_eq!(outcome, Outcome::success(Data::new().with("k", "v")));
}

#[test]
fn input_key_never_shadows_the_json_input() {
    let input = Data::new().with("input", "hello").with("uri", "a");
    let outcome = run(&format!(r#"echo "${INPUT_VAR}""#), input.clone());
    assert_eq!(outcome, Outcome::success(input));
}

#[test]
fn retry_exit_code_asks_for_a_retry() {
    assert_eq!(run(&format!("exit {EXIT_RETRY}"), Data::new()), Outcome::Retry);
}

#[test]
fn other_exit_codes_fail_with_the_last_stderr_line() {
    let outcome = run("echo first >&2; echo boom >&2; exit 3", Data::new());
    assert_eq!(outcome, Outcome::failure("exit code 3: boom"));

    assert_eq!(run("exit 4", Data::new()), Outcome::failure("exit code 4"));
}

#[test]
fn non_object_output_is_a_failure() {
    match run("echo not-json", Data::new()) {
        Outcome::Failure(reason) => assert!(reason.contains("not-json")),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[test]
fn stop_request_kills_the_command_and_reports_retry() {
    let unit = command_unit("sleeper", "sleep 5");
    let stop = CancellationToken::new();
    let ctx = WorkContext::new(Data::new(), 1, stop.clone());

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        stop.cancel();
    });

    let started = Instant::now();
    assert_eq!(unit.run(&ctx), Outcome::Retry);
    assert!(started.elapsed() < Duration::from_secs(4));
    trigger.join().unwrap();
}

#[test]
fn large_output_does_not_block_the_command() {
    let outcome = run(
        r#"i=0; while [ $i -lt 20000 ]; do echo "line $i"; i=$((i+1)); done; echo '{"done":true}'"#,
        Data::new(),
    );
    assert_eq!(outcome, Outcome::success(Data::new().with("done", true)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn command_runs_on_a_blocking_thread_of_the_runtime() {
    let unit = command_unit("echo", r#"echo '{"from":"pool"}'"#);
    let outcome = tokio::task::spawn_blocking(move || {
        let ctx = WorkContext::new(Data::new(), 1, CancellationToken::new());
        unit.run(&ctx)
    })
    .await
    .unwrap();

    assert_eq!(outcome, Outcome::success(Data::new().with("from", "pool")));
}
