//! Check-config command handler
//!
//! Validates the loaded configuration and everything derived from it without
//! connecting to the database.

use std::sync::Arc;

use crate::config::Settings;
use crate::context::SystemClock;
use crate::error::AppResult;
use crate::repositories::{MemoryDatabase, Repositories};
use crate::state::AppState;

/// Handler for the check-config command
pub struct CheckConfigCommandHandler {
    config: Settings,
}

impl CheckConfigCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Validates settings, the plan catalog and currency codes, then wires
    /// the application over an in-memory store to prove it can start.
    ///
    /// # Errors
    /// - `AppError::Configuration` for the first invalid setting
    pub fn execute(&self) -> AppResult<()> {
        self.config.validate()?;
        println!("✓ Configuration is valid");

        let catalog = self.config.plans.to_catalog()?;
        let plans: Vec<&str> = catalog.plan_ids().collect();
        println!(
            "✓ Plans: {} (default: {})",
            plans.join(", "),
            self.config.plans.default_plan
        );

        let default_currency = self.config.currency.default_currency()?;
        let pivot = self.config.currency.pivot_currency()?;
        println!("✓ Currency: default {default_currency}, pivot {pivot}");

        let repositories = Repositories::in_memory(Arc::new(MemoryDatabase::new()));
        AppState::new(self.config.clone(), repositories, Arc::new(SystemClock))?;
        println!("✓ Application wiring is valid");

        tracing::info!(
            app = %self.config.application.name,
            plans = plans.len(),
            "Configuration check passed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn create_valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/test".to_string();
        config
    }

    #[test]
    fn test_check_config_accepts_defaults() {
        let handler = CheckConfigCommandHandler::new(create_valid_config());
        assert!(handler.execute().is_ok());
    }

    #[test]
    fn test_check_config_rejects_unknown_default_plan() {
        let mut config = create_valid_config();
        config.plans.default_plan = "gold".to_string();

        let result = CheckConfigCommandHandler::new(config).execute();
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_check_config_rejects_bad_currency() {
        let mut config = create_valid_config();
        config.currency.default = "euro".to_string();

        let result = CheckConfigCommandHandler::new(config).execute();
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
