// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ChainworkError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ChainworkError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.engine,
            raw.environment,
            raw.job,
            raw.chain,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_work(cfg)?;
    validate_engine(cfg)?;
    validate_jobs(cfg)?;
    validate_chains(cfg)?;
    Ok(())
}

fn ensure_has_work(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() && cfg.chain.is_empty() {
        return Err(ChainworkError::ConfigError(
            "config must contain at least one [job.<name>] or [chain.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.workers == 0 {
        return Err(ChainworkError::ConfigError(
            "[engine].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.channel_capacity == 0 {
        return Err(ChainworkError::ConfigError(
            "[engine].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        if job.cmd.trim().is_empty() {
            return Err(ChainworkError::ConfigError(format!(
                "job '{name}' has an empty `cmd`"
            )));
        }
        if !job.constraints().has_active_constraint() {
            return Err(ChainworkError::ConfigError(format!(
                "job '{name}': please set at least one constraint \
                 (network, requires_charging, requires_idle or deadline_secs)"
            )));
        }
    }
    Ok(())
}

fn validate_chains(cfg: &RawConfigFile) -> Result<()> {
    for (name, chain) in cfg.chain.iter() {
        if chain.stages.is_empty() {
            return Err(ChainworkError::ConfigError(format!(
                "chain '{name}' must have at least one [[chain.{name}.stage]]"
            )));
        }
        for (index, stage) in chain.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ChainworkError::ConfigError(format!(
                    "chain '{name}': stage {index} has an empty `name`"
                )));
            }
            if stage.cmd.trim().is_empty() {
                return Err(ChainworkError::ConfigError(format!(
                    "chain '{name}': stage '{}' has an empty `cmd`",
                    stage.name
                )));
            }
        }
    }
    Ok(())
}
