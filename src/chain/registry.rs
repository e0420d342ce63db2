// src/chain/registry.rs

//! Unique chain names and their conflict policies.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::types::ConflictPolicy;

use super::ChainId;

#[derive(Debug, Default, Clone)]
struct RegistryEntry {
    /// The instance holding the name (running, or about to start).
    current: Option<ChainId>,
    /// Instances waiting behind `current`, oldest first.
    appended: VecDeque<ChainId>,
}

/// Decision taken for a new submission under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Start the new instance now; `superseded` must be cancelled first.
    Start { superseded: Vec<ChainId> },
    /// Wait behind `behind`.
    Enqueue { behind: ChainId },
    /// KEEP: the name is held by `existing`; drop the submission.
    Ignore { existing: ChainId },
}

/// Name → live chain instances.
///
/// Entries only ever reference live (non-terminal) instances: the owner calls
/// [`release`](Self::release) as soon as an instance reaches a terminal state.
#[derive(Debug, Default, Clone)]
pub struct UniqueWorkRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl UniqueWorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `policy` for instance `id` submitted under `name`.
    pub fn admit(&mut self, name: &str, policy: ConflictPolicy, id: ChainId) -> Admission {
        let entry = self.entries.entry(name.to_string()).or_default();

        let Some(existing) = entry.current else {
            entry.current = Some(id);
            return Admission::Start {
                superseded: Vec::new(),
            };
        };

        let admission = match policy {
            ConflictPolicy::Replace => {
                let superseded: Vec<ChainId> = std::iter::once(existing)
                    .chain(entry.appended.drain(..))
                    .collect();
                entry.current = Some(id);
                Admission::Start { superseded }
            }
            ConflictPolicy::Keep => Admission::Ignore { existing },
            ConflictPolicy::Append => {
                let behind = entry.appended.back().copied().unwrap_or(existing);
                entry.appended.push_back(id);
                Admission::Enqueue { behind }
            }
        };
        debug!(%name, %policy, chain = %id, ?admission, "registry admission");
        admission
    }

    /// Instance `id` of `name` reached a terminal state.
    ///
    /// Returns the next appended instance if `id` was holding the name.
    pub fn release(&mut self, name: &str, id: ChainId) -> Option<ChainId> {
        let entry = self.entries.get_mut(name)?;

        let next = if entry.current == Some(id) {
            entry.current = entry.appended.pop_front();
            entry.current
        } else {
            entry.appended.retain(|c| *c != id);
            None
        };

        if entry.current.is_none() && entry.appended.is_empty() {
            self.entries.remove(name);
        }
        next
    }

    /// Drop the whole entry for `name`, returning every instance it held
    /// (current first, then appended in order).
    pub fn remove(&mut self, name: &str) -> Vec<ChainId> {
        self.entries
            .remove(name)
            .map(|e| e.current.into_iter().chain(e.appended).collect())
            .unwrap_or_default()
    }

    pub fn current(&self, name: &str) -> Option<ChainId> {
        self.entries.get(name).and_then(|e| e.current)
    }

    pub fn appended(&self, name: &str) -> Vec<ChainId> {
        self.entries
            .get(name)
            .map(|e| e.appended.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
