// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every command runs inside a Nomad allocation; the job, stage and task it
//! acts for come from the `NOMAD_*` environment, not from flags.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `nomad-pipeline`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nomad-pipeline",
    version,
    about = "Run Nomad task groups as a pipeline of dependent stages.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `nomad-pipeline.toml` in the current working directory. A
    /// missing file is not an error; defaults and `NOMAD_*` variables are
    /// used instead.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NOMAD_PIPELINE_LOG`, `NOMAD_PIPELINE_DEBUG` or a default
    /// level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Commands run by the pipeline's own hook tasks.
    #[command(subcommand)]
    Agent(AgentCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum AgentCommand {
    /// Initialize job with pipeline hooks and start the root stages.
    Init,

    /// Wait for previous stage(s) to finish successfully.
    Wait(WaitArgs),

    /// Trigger next stage(s).
    Next(NextArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WaitArgs {
    /// Stages to wait for.
    #[arg(required = true, value_name = "STAGE")]
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct NextArgs {
    /// Glob of dynamic stage files, relative to the allocation directory.
    #[arg(long, value_name = "GLOB")]
    pub dynamic_tasks: Option<String>,

    /// Stages to activate.
    #[arg(value_name = "STAGE")]
    pub stages: Vec<String>,
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
