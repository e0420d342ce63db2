// src/config/mod.rs

//! Configuration loading and validation for chainwork.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`, via `TryFrom<RawConfigFile>`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ChainConfig, ConfigFile, EngineSection, EnvironmentSection, JobConfig, RawConfigFile,
    StageConfig,
};
