// src/lib.rs

pub mod cli;
pub mod completion;
pub mod config;
pub mod controller;
pub mod dag;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod nomad;
pub mod tags;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{AgentCommand, CliArgs, Command};
use crate::config::{default_config_path, load_with_env};
use crate::controller::{PipelineController, ProcessContext};
use crate::fs::RealFileSystem;
use crate::nomad::NomadClient;
use crate::watch::WatchOptions;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the Nomad client
/// - the pipeline controller for this allocation
/// - Ctrl-C handling for `wait`
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_with_env(&config_path, |key| std::env::var(key).ok())?;

    let ctx = ProcessContext::from_env()?;
    let client = NomadClient::new(&cfg.nomad, &cfg.stream).context("creating nomad client")?;

    let mut pc = PipelineController::load(
        ctx,
        client,
        Arc::new(RealFileSystem),
        WatchOptions::from(&cfg.stream),
    )
    .await?;

    let Command::Agent(command) = args.command;
    match command {
        AgentCommand::Init => {
            let update = pc.init().await?;
            persist(&mut pc, update).await
        }
        AgentCommand::Next(next) => {
            let update = pc
                .next(&next.stages, next.dynamic_tasks.as_deref())
                .await?;
            persist(&mut pc, update).await
        }
        AgentCommand::Wait(wait) => {
            pc.wait(&wait.stages, shutdown_signal()).await?;
            Ok(())
        }
    }
}

async fn persist(pc: &mut PipelineController<NomadClient>, update: bool) -> Result<()> {
    if !update {
        info!("no changes to persist");
        return Ok(());
    }
    pc.commit().await.context("error updating job")?;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler can't be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
