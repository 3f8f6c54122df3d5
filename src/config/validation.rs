//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use crate::config::error::ConfigError;
use crate::config::settings::{
    CurrencyConfig, DatabaseConfig, FileSettings, LoggerSettings, Settings, SummaryConfig,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Largest page the summary iterator may request
const MAX_ITERATOR_BATCH_SIZE: i64 = 10_000;

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty
    /// - URL must use the postgres scheme
    /// - Max connections must be greater than 0
    /// - Min connections must be greater than 0
    /// - Min connections must not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !self.is_valid_database_url() {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }

    fn is_valid_database_url(&self) -> bool {
        ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error
    /// - If file logging is enabled, path must not be empty
    /// - Log format must be one of: full, compact, json
    /// - At least one output must be enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl CurrencyConfig {
    /// Both codes must be three uppercase ASCII letters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_currency()?;
        self.pivot_currency()?;
        Ok(())
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ITERATOR_BATCH_SIZE).contains(&self.iterator_batch_size) {
            return Err(ConfigError::ValidationError {
                field: "summary.iterator_batch_size".to_string(),
                message: format!(
                    "Iterator batch size must be between 1 and {MAX_ITERATOR_BATCH_SIZE}, got {}.",
                    self.iterator_batch_size
                ),
            });
        }
        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// This method validates all sub-configurations and returns the first
    /// validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.logger.validate()?;
        self.currency.validate()?;
        self.summary.validate()?;
        self.plans.to_catalog()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::PlansConfig;

    fn valid_settings() -> Settings {
        Settings {
            database: DatabaseConfig {
                url: "postgres://localhost/subtrack".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ========================================================================
    // DatabaseConfig validation tests
    // ========================================================================

    #[test]
    fn test_database_config_empty_url() {
        let err = DatabaseConfig::default().validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "database.url")
        );
    }

    #[test]
    fn test_database_config_only_postgres() {
        for url in ["postgres://localhost/db", "postgresql://u:p@localhost:5432/db"] {
            let config = DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "URL should be valid: {}", url);
        }

        let config = DatabaseConfig {
            url: "mysql://localhost/db".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_min_exceeds_max() {
        let config = DatabaseConfig {
            url: "postgres://localhost/db".to_string(),
            max_connections: 2,
            min_connections: 5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, message } if field == "database.min_connections" && message.contains("(5)"))
        );
    }

    // ========================================================================
    // LoggerSettings validation tests
    // ========================================================================

    #[test]
    fn test_logger_settings_levels() {
        for level in ["trace", "DEBUG", "info", "warn", "error"] {
            let settings = LoggerSettings {
                level: level.to_string(),
                ..Default::default()
            };
            assert!(settings.validate().is_ok(), "level should be valid: {}", level);
        }

        let settings = LoggerSettings {
            level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_logger_settings_file_checks() {
        let mut settings = LoggerSettings::default();
        settings.file.enabled = true;
        settings.file.path = "  ".to_string();
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "logger.file.path")
        );

        settings.file.path = "logs/app.log".to_string();
        settings.file.format = "xml".to_string();
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "logger.file.format")
        );
    }

    #[test]
    fn test_logger_settings_need_an_output() {
        let mut settings = LoggerSettings::default();
        settings.console.enabled = false;
        assert!(settings.validate().is_err());
    }

    // ========================================================================
    // Settings validation tests
    // ========================================================================

    #[test]
    fn test_settings_valid() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_settings_invalid_currency() {
        let mut settings = valid_settings();
        settings.currency.pivot = "EURO".to_string();
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "currency.pivot")
        );
    }

    #[test]
    fn test_settings_invalid_batch_size() {
        let mut settings = valid_settings();
        settings.summary.iterator_batch_size = 0;
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "summary.iterator_batch_size")
        );
    }

    #[test]
    fn test_settings_invalid_plans() {
        let mut settings = valid_settings();
        settings.plans = PlansConfig {
            default_plan: "gold".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
