// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `chainwork`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "chainwork",
    version,
    about = "Run constraint-gated jobs and named work chains in the background.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Chainwork.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Chainwork.toml")]
    pub config: String,

    /// Submit every declared job and chain, then exit once the engine is idle.
    ///
    /// Without this flag, control commands are read from stdin.
    #[arg(long)]
    pub once: bool,

    /// Append one JSON record per state transition to this file.
    #[arg(long, value_name = "PATH")]
    pub journal: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHAINWORK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the declared jobs and chains, but run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
