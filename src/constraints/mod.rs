// src/constraints/mod.rs

//! Conditions a deferred job needs before it may run, and the environment
//! they are checked against.
//!
//! - [`ConstraintSet`] is the immutable requirement attached to a job.
//! - [`Environment`] is what the platform layer pushes in (network, power,
//!   idle); [`EnvironmentSnapshot`] pins it to an instant.
//! - [`evaluator`] decides whether a set is satisfied by a snapshot.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::NetworkClass;

pub mod evaluator;

pub use evaluator::{evaluate, satisfied, Verdict};

/// Requirements for running a job.
///
/// Defaults are all inactive: no network needed, charging and idle not
/// required, no override deadline. A job needs at least one active field to
/// be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstraintSet {
    pub network: NetworkClass,
    pub requires_charging: bool,
    pub requires_idle: bool,
    /// Run anyway once this much time has passed since submission, whatever
    /// the other fields say.
    pub override_deadline: Option<Duration>,
}

impl ConstraintSet {
    /// `true` if at least one field is set to something other than its
    /// inactive default.
    pub fn has_active_constraint(&self) -> bool {
        self.network != NetworkClass::None
            || self.requires_charging
            || self.requires_idle
            || self.override_deadline.is_some()
    }

    /// Absolute instant at which the override deadline fires for a job
    /// submitted at `submitted_at`.
    ///
    /// `None` when there is no deadline, or when it lies beyond what an
    /// `Instant` can represent; such a deadline never fires.
    pub fn deadline_from(&self, submitted_at: Instant) -> Option<Instant> {
        self.override_deadline
            .and_then(|d| submitted_at.checked_add(d))
    }
}

/// Current device/platform state as reported by the environment feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Environment {
    pub network: NetworkClass,
    pub charging: bool,
    pub idle: bool,
}

impl Environment {
    pub fn at(self, now: Instant) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            network: self.network,
            charging: self.charging,
            idle: self.idle,
            now,
        }
    }
}

/// [`Environment`] plus the instant it is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub network: NetworkClass,
    pub charging: bool,
    pub idle: bool,
    pub now: Instant,
}
