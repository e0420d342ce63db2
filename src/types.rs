use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Network class, used both as a job requirement and as the current state of
/// the environment feed.
///
/// - `None`: as a requirement, "no network needed"; as environment state,
///   "offline".
/// - `Any`: any connection.
/// - `Unmetered`: an unmetered connection (e.g. Wi-Fi).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    None,
    Any,
    Unmetered,
}

impl Default for NetworkClass {
    fn default() -> Self {
        NetworkClass::None
    }
}

impl NetworkClass {
    /// Whether the environment's current network (`self`) meets `required`.
    pub fn meets(self, required: NetworkClass) -> bool {
        match required {
            NetworkClass::None => true,
            NetworkClass::Any => self != NetworkClass::None,
            NetworkClass::Unmetered => self == NetworkClass::Unmetered,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkClass::None => "none",
            NetworkClass::Any => "any",
            NetworkClass::Unmetered => "unmetered",
        };
        f.write_str(s)
    }
}

impl FromStr for NetworkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(NetworkClass::None),
            "any" => Ok(NetworkClass::Any),
            "unmetered" | "wifi" => Ok(NetworkClass::Unmetered),
            other => Err(format!(
                "invalid network class: {other} (expected \"none\", \"any\" or \"unmetered\")"
            )),
        }
    }
}

/// What to do when a chain is submitted under a name that already has a live
/// instance.
///
/// - `Replace`: cancel the live instance (and anything appended behind it) and
///   start the new chain.
/// - `Keep`: leave the live instance alone and ignore the new submission.
/// - `Append`: queue the new chain; it starts once everything ahead of it has
///   reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    Replace,
    Keep,
    Append,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Replace
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Keep => "keep",
            ConflictPolicy::Append => "append",
        };
        f.write_str(s)
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(ConflictPolicy::Replace),
            "keep" => Ok(ConflictPolicy::Keep),
            "append" => Ok(ConflictPolicy::Append),
            other => Err(format!(
                "invalid conflict policy: {other} (expected \"replace\", \"keep\" or \"append\")"
            )),
        }
    }
}
