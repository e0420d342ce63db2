// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::chain::ChainRequest;
use crate::constraints::{ConstraintSet, Environment};
use crate::engine::EngineOptions;
use crate::exec::PoolOptions;
use crate::jobs::JobRequest;
use crate::types::{ConflictPolicy, NetworkClass};
use crate::work::{command_unit, Data};

/// Top-level configuration exactly as read from a TOML file.
///
/// ```toml
/// [engine]
/// workers = 2
///
/// [environment]
/// network = "none"
///
/// [job.notify]
/// cmd = "echo job ran"
/// network = "unmetered"
/// deadline_secs = 10
///
/// [chain.blur]
/// policy = "replace"
/// seed = { uri = "a" }
/// [[chain.blur.stage]]
/// name = "cleanup"
/// cmd = "true"
/// ```
///
/// Every section is optional, but validation requires at least one job or
/// chain. Use `ConfigFile::try_from` to validate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub environment: EnvironmentSection,

    /// All jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,

    /// All chains from `[chain.<name>]`; the key is the unique chain name.
    #[serde(default)]
    pub chain: BTreeMap<String, ChainConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub environment: EnvironmentSection,
    pub job: BTreeMap<String, JobConfig>,
    pub chain: BTreeMap<String, ChainConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Executor slots.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause before re-running a unit that asked for a retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How long finished jobs and chains stay queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Capacity of the runtime event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_workers() -> usize {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_retention_secs() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retention_secs: default_retention_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// `[environment]` section: the environment at startup.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EnvironmentSection {
    #[serde(default)]
    pub network: NetworkClass,
    #[serde(default)]
    pub charging: bool,
    #[serde(default)]
    pub idle: bool,
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Shell command run when the constraints are met.
    pub cmd: String,

    #[serde(default)]
    pub network: NetworkClass,

    #[serde(default)]
    pub requires_charging: bool,

    #[serde(default)]
    pub requires_idle: bool,

    /// Run anyway this many seconds after submission.
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Input handed to the command.
    #[serde(default)]
    pub payload: Data,
}

impl JobConfig {
    pub fn constraints(&self) -> ConstraintSet {
        ConstraintSet {
            network: self.network,
            requires_charging: self.requires_charging,
            requires_idle: self.requires_idle,
            override_deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// `[chain.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub policy: ConflictPolicy,

    /// Input of the first stage.
    #[serde(default)]
    pub seed: Data,

    /// `[[chain.<name>.stage]]` entries, run in order.
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageConfig>,
}

/// One `[[chain.<name>.stage]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConfigFile {
    /// Build without validation; prefer `ConfigFile::try_from(raw)`.
    pub fn new_unchecked(
        engine: EngineSection,
        environment: EnvironmentSection,
        job: BTreeMap<String, JobConfig>,
        chain: BTreeMap<String, ChainConfig>,
    ) -> Self {
        Self {
            engine,
            environment,
            job,
            chain,
        }
    }

    pub fn engine_options(&self, exit_when_idle: bool) -> EngineOptions {
        EngineOptions {
            exit_when_idle,
            retention: Duration::from_secs(self.engine.retention_secs),
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            workers: self.engine.workers,
            retry_backoff: Duration::from_millis(self.engine.retry_backoff_ms),
        }
    }

    pub fn initial_environment(&self) -> Environment {
        Environment {
            network: self.environment.network,
            charging: self.environment.charging,
            idle: self.environment.idle,
        }
    }

    /// Submission for `[job.<name>]`, with a shell-command unit.
    pub fn job_request(&self, name: &str) -> Option<JobRequest> {
        let job = self.job.get(name)?;
        let unit = command_unit(name, job.cmd.as_str());
        Some(JobRequest {
            unit,
            payload: job.payload.clone(),
            constraints: job.constraints(),
            tags: job.tags.iter().cloned().collect(),
        })
    }

    /// Submission for `[chain.<name>]`, one shell-command unit per stage.
    pub fn chain_request(&self, name: &str) -> Option<ChainRequest> {
        let chain = self.chain.get(name)?;
        let stages = chain
            .stages
            .iter()
            .map(|s| command_unit(s.name.as_str(), s.cmd.as_str()).with_tags(s.tags.iter().cloned()))
            .collect();
        Some(ChainRequest::new(name, chain.policy, stages).with_seed(chain.seed.clone()))
    }
}
