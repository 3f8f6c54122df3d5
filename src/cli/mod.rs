//! CLI module for subtrack
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing with clap
//! - Configuration loading honoring `--config` and `--env`
//! - Command execution for check-config, migrate and summary

pub mod executor;
pub mod handlers;
pub mod parser;
pub mod validation;

pub use executor::execute_command;
pub use parser::{Cli, Commands, Environment, SummaryArgs};

use crate::config::{ConfigError, ConfigLoader, Settings};
use crate::logger::init_logger;

/// Load configuration, applying the CLI's file and environment overrides
///
/// # Errors
/// Returns error if configuration loading or validation fails
pub fn load_config(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut loader = ConfigLoader::new()?;
    if let Some(ref path) = cli.config {
        loader = loader.with_config_file(path);
    }
    if let Some(env) = cli.env {
        loader = loader.with_environment(env.into());
    }
    loader.load()
}

/// Initialize logger from settings, honoring --verbose and --quiet
///
/// # Errors
/// Returns error if the logger settings are invalid or a subscriber is
/// already installed
pub fn init_logger_from(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let mut logger = settings.logger.clone();
    if let Some(level) = cli.log_level_override() {
        logger.level = level.to_string();
    }
    let config = logger.into_logger_config()?;
    init_logger(config)?;
    Ok(())
}
