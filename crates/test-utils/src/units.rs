//! Work units with scripted behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chainwork::work::{Data, Outcome, WorkUnit};

/// Every invocation seen by a [`recording`] unit: `(unit name, input)`.
pub type CallLog = Arc<Mutex<Vec<(String, Data)>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<(String, Data)> {
    log.lock().unwrap().clone()
}

/// Names of the units in `log`, in call order.
pub fn call_names(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
}

/// Returns its input unchanged.
pub fn pass_through(name: &str) -> WorkUnit {
    WorkUnit::new(name, |ctx| Outcome::success(ctx.input().clone()))
}

/// Always succeeds with `output`.
pub fn succeed_with(name: &str, output: Data) -> WorkUnit {
    WorkUnit::new(name, move |_| Outcome::success(output.clone()))
}

/// Always fails with `reason`.
pub fn failing(name: &str, reason: &str) -> WorkUnit {
    let reason = reason.to_string();
    WorkUnit::new(name, move |_| Outcome::failure(reason.clone()))
}

/// Records its input in `log`, then succeeds with the input plus
/// `last = <name>`.
pub fn recording(name: &str, log: &CallLog) -> WorkUnit {
    let log = Arc::clone(log);
    let unit_name = name.to_string();
    WorkUnit::new(name, move |ctx| {
        log.lock()
            .unwrap()
            .push((unit_name.clone(), ctx.input().clone()));
        Outcome::success(ctx.input().clone().with("last", unit_name.as_str()))
    })
}

/// Returns `outcomes` in order, repeating the last one; records every call.
pub fn scripted(name: &str, outcomes: Vec<Outcome>, log: &CallLog) -> WorkUnit {
    let log = Arc::clone(log);
    let unit_name = name.to_string();
    let next = Arc::new(AtomicUsize::new(0));
    WorkUnit::new(name, move |ctx| {
        log.lock()
            .unwrap()
            .push((unit_name.clone(), ctx.input().clone()));
        let i = next.fetch_add(1, Ordering::SeqCst);
        outcomes
            .get(i)
            .or_else(|| outcomes.last())
            .cloned()
            .unwrap_or(Outcome::Retry)
    })
}

/// Panics every time.
pub fn panicking(name: &str) -> WorkUnit {
    WorkUnit::new(name, |_| panic!("unit blew up"))
}

#[derive(Default)]
struct GateState {
    release: Option<Outcome>,
    started: usize,
    stop_seen: usize,
}

/// Remote control for a [`gated`] unit.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    /// Let every current and future invocation return `outcome`.
    pub fn release(&self, outcome: Outcome) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().release = Some(outcome);
        cvar.notify_all();
    }

    pub fn started(&self) -> usize {
        self.inner.0.lock().unwrap().started
    }

    /// How many invocations returned because a stop was requested.
    pub fn stop_seen(&self) -> usize {
        self.inner.0.lock().unwrap().stop_seen
    }

    /// Wait until at least `n` invocations have started.
    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_stop_seen(&self, n: usize) {
        while self.stop_seen() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A unit that blocks until its [`Gate`] is released or a stop is requested.
///
/// On a stop request it returns `on_stop`.
pub fn gated(name: &str, on_stop: Outcome) -> (WorkUnit, Gate) {
    let gate = Gate::default();
    let inner = Arc::clone(&gate.inner);

    let unit = WorkUnit::new(name, move |ctx| {
        let (lock, cvar) = &*inner;
        let mut state = lock.lock().unwrap();
        state.started += 1;
        loop {
            if let Some(outcome) = state.release.clone() {
                return outcome;
            }
            if ctx.is_stop_requested() {
                state.stop_seen += 1;
                return on_stop.clone();
            }
            state = cvar
                .wait_timeout(state, Duration::from_millis(5))
                .unwrap()
                .0;
        }
    });

    (unit, gate)
}
