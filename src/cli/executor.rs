//! Command executor for dispatching CLI commands
//!
//! This module provides the main entry point for executing CLI commands
//! after parsing and configuration loading.

use super::handlers::{CheckConfigCommandHandler, MigrateCommandHandler, SummaryCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::Settings;
use crate::error::{AppError, AppResult};

/// Execute a CLI command with the given settings
///
/// Running without a subcommand behaves like `check-config`.
///
/// # Arguments
/// * `cli` - Parsed CLI arguments
/// * `settings` - Loaded and validated settings
///
/// # Errors
/// Returns errors from command handlers or argument validation failures
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    validate_command_args(cli)?;

    match &cli.command {
        Some(Commands::CheckConfig) | None => CheckConfigCommandHandler::new(settings).execute(),
        Some(Commands::Migrate { dry_run, rollback }) => {
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
        Some(Commands::Summary(args)) => SummaryCommandHandler::new(settings).execute(args).await,
    }
}

/// Validate command arguments before execution
fn validate_command_args(cli: &Cli) -> AppResult<()> {
    cli.validate()
        .map_err(|msg| AppError::validation("cli_arguments", msg))?;

    if let Some(Commands::Migrate {
        rollback: Some(steps),
        ..
    }) = cli.command
        && steps > 50
    {
        tracing::warn!(
            steps,
            "Rolling back many migrations at once, consider smaller steps"
        );
    }

    Ok(())
}
