//! Configuration settings structures for subtrack
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};
use crate::models::{Currency, Feature, FeatureKind, Plan, PlanCatalog};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "subtrack".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/subtrack.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_iterator_batch_size() -> i64 {
    10
}

fn default_plan() -> String {
    "free".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Database connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Logger Configuration
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Colored output, only honoured on a terminal
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            colored: true,
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_path")]
    pub path: String,

    /// Append to an existing file instead of truncating it
    #[serde(default = "default_true")]
    pub append: bool,

    /// "full", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: true,
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert LoggerSettings to the runtime LoggerConfig used by the logger module.
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_config = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file_config = self.file.into_file_config()?;

        LoggerConfig::new(console_config, file_config, self.level).map_err(|e| {
            ConfigError::ValidationError {
                field: "logger".to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl FileSettings {
    /// Convert FileSettings to FileConfig
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format).map_err(|e| {
            ConfigError::ValidationError {
                field: "logger.file".to_string(),
                message: e.to_string(),
            }
        })
    }
}

// ============================================================================
// Currency and Summary Configuration
// ============================================================================

/// Currency settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Currency used when a user has no preference
    #[serde(default = "default_currency")]
    pub default: String,

    /// Currency cross rates are computed through
    #[serde(default = "default_currency")]
    pub pivot: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            default: default_currency(),
            pivot: default_currency(),
        }
    }
}

impl CurrencyConfig {
    pub fn default_currency(&self) -> Result<Currency, ConfigError> {
        parse_currency("currency.default", &self.default)
    }

    pub fn pivot_currency(&self) -> Result<Currency, ConfigError> {
        parse_currency("currency.pivot", &self.pivot)
    }
}

fn parse_currency(field: &str, code: &str) -> Result<Currency, ConfigError> {
    code.parse::<Currency>()
        .map_err(|e| ConfigError::validation(field.to_string(), e.to_string()))
}

/// Summary aggregation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Subscriptions fetched per page while aggregating
    #[serde(default = "default_iterator_batch_size")]
    pub iterator_batch_size: i64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            iterator_batch_size: default_iterator_batch_size(),
        }
    }
}

// ============================================================================
// Plan Configuration
// ============================================================================

/// A single feature entry of a configured plan.
///
/// Quotas take a non-negative integer or `"unlimited"`, capabilities take a
/// boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSetting {
    Enabled(bool),
    Limit(i64),
    Keyword(String),
}

const UNLIMITED: &str = "unlimited";

/// A configured plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSettings {
    #[serde(default)]
    pub features: BTreeMap<Feature, FeatureSetting>,
}

/// Plan catalog configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlansConfig {
    /// Plan applied to accounts whose plan id is unknown
    #[serde(default = "default_plan")]
    pub default_plan: String,

    /// Plans keyed by id; the built-in free and premium plans are used when empty
    #[serde(default)]
    pub catalog: BTreeMap<String, PlanSettings>,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            default_plan: default_plan(),
            catalog: BTreeMap::new(),
        }
    }
}

impl PlansConfig {
    /// Builds the runtime catalog, rejecting settings whose shape does not
    /// match the feature kind.
    pub fn to_catalog(&self) -> Result<PlanCatalog, ConfigError> {
        if self.catalog.is_empty() {
            let catalog = PlanCatalog::default();
            if catalog.get(&self.default_plan).is_none() {
                return Err(unknown_default_plan(&self.default_plan));
            }
            return Ok(PlanCatalog::new(
                ["free", "premium"]
                    .into_iter()
                    .filter_map(|id| catalog.get(id).cloned()),
                self.default_plan.clone(),
            ));
        }

        if !self.catalog.contains_key(&self.default_plan) {
            return Err(unknown_default_plan(&self.default_plan));
        }

        let mut plans = Vec::with_capacity(self.catalog.len());
        for (id, settings) in &self.catalog {
            let mut plan = Plan::new(id.clone());
            for (feature, setting) in &settings.features {
                let field = format!("plans.catalog.{id}.features.{feature}");
                plan = match (feature.kind(), setting) {
                    (FeatureKind::Capability, FeatureSetting::Enabled(enabled)) => {
                        plan.with_capability(*feature, *enabled)
                    }
                    (FeatureKind::Quota, FeatureSetting::Limit(limit)) if *limit >= 0 => {
                        plan.with_quota(*feature, Some(*limit))
                    }
                    (FeatureKind::Quota, FeatureSetting::Keyword(word)) if word == UNLIMITED => {
                        plan.with_quota(*feature, None)
                    }
                    (FeatureKind::Quota, _) => {
                        return Err(ConfigError::validation(
                            field,
                            "Quota must be a non-negative integer or \"unlimited\".".to_string(),
                        ));
                    }
                    (FeatureKind::Capability, _) => {
                        return Err(ConfigError::validation(
                            field,
                            "Capability must be true or false.".to_string(),
                        ));
                    }
                };
            }
            plans.push(plan);
        }
        Ok(PlanCatalog::new(plans, self.default_plan.clone()))
    }
}

fn unknown_default_plan(plan: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: "plans.default_plan".to_string(),
        message: format!("Default plan '{plan}' is not defined in the catalog."),
    }
}

// ============================================================================
// Root Settings
// ============================================================================

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Application information
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Currency configuration
    #[serde(default)]
    pub currency: CurrencyConfig,

    /// Summary configuration
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Plan catalog
    #[serde(default)]
    pub plans: PlansConfig,
}
