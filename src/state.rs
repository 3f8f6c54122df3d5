//! Application state shared by every request.
//!
//! Holds the settings together with the repositories, services and handlers
//! built from them.

use std::sync::Arc;

use crate::config::{ConfigError, Settings};
use crate::context::{SharedClock, SystemClock};
use crate::db::{establish_async_connection_pool, run_pending_migrations};
use crate::error::AppResult;
use crate::handlers::Handlers;
use crate::repositories::Repositories;
use crate::services::Services;

/// Application state containing all shared services and resources.
///
/// Cloning is cheap since every member is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub repositories: Repositories,
    pub services: Services,
    pub handlers: Handlers,
}

impl AppState {
    /// Wires services and handlers over the given repositories.
    ///
    /// # Arguments
    /// * `settings` - Validated application settings
    /// * `repositories` - Storage backend
    /// * `clock` - Source of "now"
    ///
    /// # Errors
    /// `ConfigError` when the plan catalog or a currency setting is invalid.
    ///
    /// # Example
    /// ```ignore
    /// let repos = Repositories::in_memory(Arc::new(MemoryDatabase::new()));
    /// let state = AppState::new(settings, repos, Arc::new(SystemClock))?;
    /// ```
    pub fn new(
        settings: Settings,
        repositories: Repositories,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        let catalog = Arc::new(settings.plans.to_catalog()?);
        let services = Services::new(
            &repositories,
            catalog,
            clock,
            settings.currency.pivot_currency()?,
            settings.summary.iterator_batch_size,
        );
        let handlers = Handlers::new(
            &repositories,
            &services,
            settings.currency.default_currency()?,
        );
        Ok(Self {
            settings: Arc::new(settings),
            repositories,
            services,
            handlers,
        })
    }

    /// Connects to PostgreSQL and builds the state on top of it. Pending
    /// migrations are applied first when `database.auto_migrate` is set.
    pub async fn connect(settings: Settings) -> AppResult<Self> {
        if settings.database.auto_migrate {
            let applied = run_pending_migrations(settings.database.url.clone()).await?;
            tracing::info!(applied = applied.len(), "Pending migrations applied on startup");
        }
        let pool = establish_async_connection_pool(&settings.database).await?;
        let state = Self::new(settings, Repositories::postgres(pool), Arc::new(SystemClock))?;
        Ok(state)
    }
}
