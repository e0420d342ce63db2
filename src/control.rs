// src/control.rs

//! Line-oriented control commands read by the interactive CLI.
//!
//! ```text
//! job <name>
//! chain <name>
//! env [network=none|any|unmetered] [charging=on|off] [idle=on|off]
//! cancel-jobs
//! cancel-job <job-N>
//! cancel-chain <name>
//! status <job-N|chain-N>
//! quit
//! ```

use std::str::FromStr;

use crate::constraints::Environment;
use crate::jobs::JobId;
use crate::status::EntityId;
use crate::types::NetworkClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Submit `[job.<name>]`.
    Job(String),
    /// Submit `[chain.<name>]`.
    Chain(String),
    Env(EnvChange),
    CancelJobs,
    CancelJob(JobId),
    CancelChain(String),
    Status(EntityId),
    Quit,
}

/// Partial environment update; unset fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvChange {
    pub network: Option<NetworkClass>,
    pub charging: Option<bool>,
    pub idle: Option<bool>,
}

impl EnvChange {
    pub fn apply(&self, current: Environment) -> Environment {
        Environment {
            network: self.network.unwrap_or(current.network),
            charging: self.charging.unwrap_or(current.charging),
            idle: self.idle.unwrap_or(current.idle),
        }
    }
}

impl FromStr for EnvChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut change = EnvChange::default();
        for pair in s.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
            match key {
                "network" => change.network = Some(value.parse()?),
                "charging" => change.charging = Some(parse_switch(value)?),
                "idle" => change.idle = Some(parse_switch(value)?),
                other => return Err(format!("unknown environment key '{other}'")),
            }
        }
        Ok(change)
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on/off, got '{other}'")),
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let required = |what: &str| -> Result<String, String> {
            if rest.is_empty() {
                Err(format!("'{verb}' needs {what}"))
            } else {
                Ok(rest.to_string())
            }
        };

        match verb {
            "job" => Ok(ControlCommand::Job(required("a job name")?)),
            "chain" => Ok(ControlCommand::Chain(required("a chain name")?)),
            "env" => Ok(ControlCommand::Env(rest.parse()?)),
            "cancel-jobs" => Ok(ControlCommand::CancelJobs),
            "cancel-job" => Ok(ControlCommand::CancelJob(required("a job id")?.parse()?)),
            "cancel-chain" => Ok(ControlCommand::CancelChain(required("a chain name")?)),
            "status" => Ok(ControlCommand::Status(required("an id")?.parse()?)),
            "quit" | "exit" => Ok(ControlCommand::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}
