pub mod builders;
pub mod fake_executor;
pub mod manual_executor;
pub mod units;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

use tokio::sync::mpsc;

use chainwork::constraints::Environment;
use chainwork::engine::{EngineCore, EngineOptions, Runtime, RuntimeEvent, Scheduler};
use chainwork::exec::ExecutorBackend;
use chainwork::status::StatusStream;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A runtime spawned on the current Tokio runtime, plus its handle.
pub struct TestEngine {
    pub scheduler: Scheduler,
    pub runtime: tokio::task::JoinHandle<chainwork::errors::Result<()>>,
}

/// Wire a core, a runtime and a scheduler around the executor built by
/// `make_executor`, and spawn the runtime.
pub fn spawn_engine<E, F>(environment: Environment, options: EngineOptions, make_executor: F) -> TestEngine
where
    E: ExecutorBackend + 'static,
    F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
{
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let status = StatusStream::new();
    let executor = make_executor(tx.clone());
    let core = EngineCore::new(environment, options);
    let runtime = Runtime::new(core, rx, executor, status.clone());

    TestEngine {
        scheduler: Scheduler::new(tx, status),
        runtime: tokio::spawn(runtime.run()),
    }
}
