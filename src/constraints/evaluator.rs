// src/constraints/evaluator.rs

use tokio::time::Instant;

use super::{ConstraintSet, EnvironmentSnapshot};

/// Why a constraint set is (or is not) satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Unsatisfied,
    /// Every declared condition holds.
    ConditionsMet,
    /// The override deadline has passed; conditions were not consulted.
    DeadlineExpired,
}

impl Verdict {
    pub fn is_satisfied(self) -> bool {
        !matches!(self, Verdict::Unsatisfied)
    }
}

/// Evaluate `constraints` for a job submitted at `submitted_at`.
///
/// Conjunctive over network, charging and idle. An expired override deadline
/// satisfies the whole set on its own.
pub fn evaluate(
    constraints: &ConstraintSet,
    snapshot: &EnvironmentSnapshot,
    submitted_at: Instant,
) -> Verdict {
    if let Some(deadline) = constraints.deadline_from(submitted_at) {
        if snapshot.now >= deadline {
            return Verdict::DeadlineExpired;
        }
    }

    let network_ok = snapshot.network.meets(constraints.network);
    let charging_ok = !constraints.requires_charging || snapshot.charging;
    let idle_ok = !constraints.requires_idle || snapshot.idle;

    if network_ok && charging_ok && idle_ok {
        Verdict::ConditionsMet
    } else {
        Verdict::Unsatisfied
    }
}

/// Boolean form of [`evaluate`].
pub fn satisfied(
    constraints: &ConstraintSet,
    snapshot: &EnvironmentSnapshot,
    submitted_at: Instant,
) -> bool {
    evaluate(constraints, snapshot, submitted_at).is_satisfied()
}
