// src/config/mod.rs

//! Configuration loading and validation for nomad-pipeline.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk, applying environment overrides (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//!
//! Per-invocation inputs (job id, group, task, alloc) are not configuration;
//! see [`crate::controller::ProcessContext`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_with_env};
pub use model::{ConfigFile, NomadSection, RawConfigFile, StreamSection};
pub use validate::validate_config;
