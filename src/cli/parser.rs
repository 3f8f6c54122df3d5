//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::build;
use crate::models::Currency;
use crate::services::SummaryQuery;

/// Operator tooling for the subtrack subscription tracker
#[derive(Parser, Debug)]
#[command(name = "subtrack")]
#[command(about = "Operator tooling for the subtrack subscription tracker")]
#[command(long_about = "
subtrack keeps track of personal and family subscriptions, enforces plan
entitlements and reports spending summaries. This binary manages the
database schema, validates deployments and prints summaries for a user.

EXAMPLES:
    # Validate the layered configuration
    subtrack check-config

    # Use a custom configuration file
    subtrack --config /etc/subtrack/production.toml check-config

    # Run database migrations
    subtrack migrate

    # Preview pending migrations
    subtrack migrate --dry-run

    # Rollback the last 2 migrations
    subtrack migrate --rollback 2

    # Print a summary for a user in euros
    subtrack summary --user auth0|42 --currency EUR --top-providers 5 --monthly
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load only this TOML file instead of the layered configuration
    /// directory. Environment variable overrides still apply.
    ///
    /// Example: --config /etc/subtrack/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which `{environment}.toml` layer is loaded.
    ///
    /// Available values: development (dev), test, staging, production (prod)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    ///
    /// Raises the log level to debug. Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Lowers the log level to error. Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and exit (default)
    ///
    /// Loads every configuration layer, validates it, and builds the plan
    /// catalog and currency settings without touching the database.
    CheckConfig,

    /// Database migration operations
    ///
    /// Examples:
    ///   subtrack migrate                    # Apply all pending migrations
    ///   subtrack migrate --dry-run          # Show pending migrations without applying
    ///   subtrack migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback
        ///
        /// Reverts the specified number of most recent migrations.
        /// Must be between 1 and 100.
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },

    /// Print the spending summary of a user as JSON
    ///
    /// The summary covers every subscription the user can see, personal ones
    /// and those of their family.
    Summary(SummaryArgs),
}

/// Arguments of the `summary` command
#[derive(clap::Args, Debug, Clone)]
pub struct SummaryArgs {
    /// Identity provider id of the user
    #[arg(short, long, value_name = "USER_ID", value_parser = super::validation::validate_user_id)]
    pub user: String,

    /// Plan used when the user has no stored account yet
    #[arg(long, value_name = "PLAN")]
    pub plan: Option<String>,

    /// Currency of the reported amounts, defaults to the user's preference
    #[arg(long, value_name = "CODE", value_parser = super::validation::validate_currency)]
    pub currency: Option<Currency>,

    /// Number of most expensive providers to list
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub top_providers: u8,

    /// Number of most expensive labels to list
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub top_labels: u8,

    /// Number of upcoming renewals to list
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub upcoming_renewals: u8,

    /// Include monthly totals
    #[arg(long)]
    pub monthly: bool,

    /// Include yearly totals
    #[arg(long)]
    pub yearly: bool,
}

impl SummaryArgs {
    pub fn to_query(&self) -> SummaryQuery {
        SummaryQuery {
            top_providers: self.top_providers,
            top_labels: self.top_labels,
            upcoming_renewals: self.upcoming_renewals,
            total_monthly: self.monthly,
            total_yearly: self.yearly,
        }
    }
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

impl Cli {
    /// Validate CLI arguments and provide detailed error messages
    ///
    /// Covers argument combinations clap cannot express when the struct is
    /// built by hand rather than parsed.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Migrate {
            dry_run: true,
            rollback: Some(_),
        }) = self.command
        {
            return Err("Cannot use --dry-run and --rollback together".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        Ok(())
    }

    /// Log level forced by --verbose or --quiet, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_flag() {
        let result = Cli::try_parse_from(["subtrack", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["subtrack", "--version"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_default_behavior() {
        let cli = Cli::try_parse_from(["subtrack"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(!cli.quiet);
        assert!(cli.config.is_none());
        assert!(cli.env.is_none());
        assert_eq!(cli.log_level_override(), None);
    }

    #[test]
    fn test_migrate_command() {
        let cli = Cli::try_parse_from(["subtrack", "migrate", "--dry-run"]).unwrap();
        if let Some(Commands::Migrate { dry_run, rollback }) = cli.command {
            assert!(dry_run);
            assert!(rollback.is_none());
        } else {
            panic!("Expected Migrate command");
        }
    }

    #[test]
    fn test_migrate_rejects_dry_run_with_rollback() {
        let result = Cli::try_parse_from(["subtrack", "migrate", "--dry-run", "--rollback", "2"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_summary_command() {
        let cli = Cli::try_parse_from([
            "subtrack",
            "summary",
            "--user",
            "u1",
            "--currency",
            "eur",
            "--top-providers",
            "3",
            "--monthly",
        ])
        .unwrap();
        let Some(Commands::Summary(args)) = cli.command else {
            panic!("Expected Summary command");
        };
        assert_eq!(args.user, "u1");
        assert_eq!(args.currency.as_ref().unwrap().as_str(), "EUR");

        let query = args.to_query();
        assert_eq!(query.top_providers, 3);
        assert_eq!(query.top_labels, 0);
        assert!(query.total_monthly);
        assert!(!query.total_yearly);
    }

    #[test]
    fn test_summary_requires_user() {
        let result = Cli::try_parse_from(["subtrack", "summary"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_env_alias() {
        let cli = Cli::try_parse_from(["subtrack", "--env", "prod", "check-config"]).unwrap();
        let env: crate::config::Environment = cli.env.unwrap().into();
        assert_eq!(env, crate::config::Environment::Production);
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::try_parse_from(["subtrack", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_level_override(), Some("debug"));
    }

    #[test]
    fn test_conflicting_verbose_quiet() {
        let result = Cli::try_parse_from(["subtrack", "--verbose", "--quiet"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_validate_hand_built_conflict() {
        let cli = Cli {
            command: Some(Commands::Migrate {
                dry_run: true,
                rollback: Some(5),
            }),
            config: None,
            env: None,
            verbose: false,
            quiet: false,
        };
        assert!(cli.validate().is_err());
    }
}
