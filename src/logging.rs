// src/logging.rs

//! Logging setup for `nomad-pipeline` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `NOMAD_PIPELINE_LOG` environment variable (e.g. "info", "debug")
//! 3. `NOMAD_PIPELINE_DEBUG` set to anything non-empty means "debug"
//! 4. default to `info`
//!
//! `NOMAD_PIPELINE_LOG_JSON` switches to one JSON object per line. Logs are
//! sent to STDERR; Nomad keeps them with the hook task's stderr.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "NOMAD_PIPELINE_LOG";
pub const DEBUG_ENV: &str = "NOMAD_PIPELINE_DEBUG";
pub const JSON_ENV: &str = "NOMAD_PIPELINE_LOG_JSON";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = |key: &str| std::env::var(key).ok();
    let level = resolve_level(cli_level, env);
    let json = env(JSON_ENV).is_some_and(|v| !v.trim().is_empty());

    let builder = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().try_init().map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(())
}

/// Pick the log level from the flag, then the environment.
pub fn resolve_level<F>(cli_level: Option<LogLevel>, env: F) -> Level
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }

    if let Some(level) = env(LOG_ENV).and_then(|s| parse_level_str(&s)) {
        return level;
    }

    if env(DEBUG_ENV).is_some_and(|v| !v.trim().is_empty()) {
        return Level::DEBUG;
    }

    Level::INFO
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
