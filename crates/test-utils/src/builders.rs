#![allow(dead_code)]

use std::collections::BTreeMap;

use chainwork::config::{
    ChainConfig, ConfigFile, EngineSection, EnvironmentSection, JobConfig, RawConfigFile,
    StageConfig,
};
use chainwork::types::{ConflictPolicy, NetworkClass};
use chainwork::work::Data;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                environment: EnvironmentSection::default(),
                job: BTreeMap::new(),
                chain: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn with_chain(mut self, name: &str, chain: ChainConfig) -> Self {
        self.config.chain.insert(name.to_string(), chain);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.engine.workers = workers;
        self
    }

    pub fn with_network(mut self, network: NetworkClass) -> Self {
        self.config.environment.network = network;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            job: JobConfig {
                cmd: cmd.to_string(),
                network: NetworkClass::None,
                requires_charging: false,
                requires_idle: false,
                deadline_secs: None,
                tags: vec![],
                payload: Data::new(),
            },
        }
    }

    pub fn network(mut self, network: NetworkClass) -> Self {
        self.job.network = network;
        self
    }

    pub fn requires_charging(mut self, val: bool) -> Self {
        self.job.requires_charging = val;
        self
    }

    pub fn requires_idle(mut self, val: bool) -> Self {
        self.job.requires_idle = val;
        self
    }

    pub fn deadline_secs(mut self, secs: u64) -> Self {
        self.job.deadline_secs = Some(secs);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.job.tags.push(tag.to_string());
        self
    }

    pub fn payload(mut self, payload: Data) -> Self {
        self.job.payload = payload;
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

/// Builder for `ChainConfig`.
pub struct ChainConfigBuilder {
    chain: ChainConfig,
}

impl ChainConfigBuilder {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            chain: ChainConfig {
                policy,
                seed: Data::new(),
                stages: vec![],
            },
        }
    }

    pub fn seed(mut self, seed: Data) -> Self {
        self.chain.seed = seed;
        self
    }

    pub fn stage(mut self, name: &str, cmd: &str) -> Self {
        self.chain.stages.push(StageConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
            tags: vec![],
        });
        self
    }

    pub fn tagged_stage(mut self, name: &str, cmd: &str, tag: &str) -> Self {
        self.chain.stages.push(StageConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
            tags: vec![tag.to_string()],
        });
        self
    }

    pub fn build(self) -> ChainConfig {
        self.chain
    }
}
