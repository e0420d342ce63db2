// src/work/unit.rs

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::work::Data;

/// Terminal result of one invocation of a [`WorkUnit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The unit finished; its output becomes the next stage's input.
    Success(Data),
    /// Invoke the same unit again with the same input.
    ///
    /// After a stop request this also means "I did not finish".
    Retry,
    /// The unit failed; a chain stops here.
    Failure(String),
}

impl Outcome {
    pub fn success(output: Data) -> Self {
        Outcome::Success(output)
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// What a running unit can see: its input, which attempt this is, and whether
/// the engine has asked it to stop.
#[derive(Debug)]
pub struct WorkContext {
    input: Data,
    attempt: u32,
    stop: CancellationToken,
}

impl WorkContext {
    pub fn new(input: Data, attempt: u32, stop: CancellationToken) -> Self {
        Self {
            input,
            attempt,
            stop,
        }
    }

    pub fn input(&self) -> &Data {
        &self.input
    }

    /// 1 for the first invocation, 2 for the first retry, and so on.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Checkpoint for cooperative cancellation.
    ///
    /// Long-running units should poll this and return early (usually with
    /// [`Outcome::Retry`]) once it is `true`.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Give the input back, e.g. so it can be reused for a retry.
    pub fn into_input(self) -> Data {
        self.input
    }
}

type RunFn = dyn Fn(&WorkContext) -> Outcome + Send + Sync;

/// A single named unit of work.
///
/// The function is stateless from the engine's point of view and may be
/// invoked more than once (on `Retry`). Cloning a `WorkUnit` is cheap.
#[derive(Clone)]
pub struct WorkUnit {
    name: String,
    tags: BTreeSet<String>,
    run: Arc<RunFn>,
}

impl WorkUnit {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&WorkContext) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            run: Arc::new(run),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn run(&self, ctx: &WorkContext) -> Outcome {
        (self.run)(ctx)
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
