pub mod config;
pub mod criteria;
pub mod jira;
pub mod providers;
pub mod run;
pub mod serve;

use acgen_core::config::Config;
use acgen_core::Pipeline;
use anyhow::Context;
use std::path::Path;

/// Config file plus environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_with_env(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    Pipeline::from_config(config).context("failed to set up pipeline")
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
