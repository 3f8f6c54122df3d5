//! Migrate command handler
//!
//! Applies, previews or reverts the embedded schema migrations.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use crate::config::Settings;
use crate::db::{MIGRATIONS, run_pending_migrations};
use crate::error::{AppError, AppResult};

/// Handler for the migrate command
pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Execute the migrate command with dry-run and rollback support
    ///
    /// # Arguments
    /// * `dry_run` - If true, shows pending migrations without applying them
    /// * `rollback` - Optional number of migrations to rollback
    ///
    /// # Errors
    /// - Configuration validation errors
    /// - Database connection errors
    /// - Migration execution errors
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        if let Some(0) = rollback {
            return Err(AppError::validation(
                "rollback_steps",
                "Number of rollback steps must be greater than 0",
            ));
        }

        self.config.database.validate()?;

        if dry_run {
            self.show_pending_migrations().await
        } else if let Some(steps) = rollback {
            self.rollback_migrations(steps).await
        } else {
            self.run_migrations().await
        }
    }

    async fn show_pending_migrations(&self) -> AppResult<()> {
        println!("Checking for pending migrations...");

        let pending = self
            .with_connection("check pending migrations", |conn| {
                let pending = conn
                    .pending_migrations(MIGRATIONS)
                    .map_err(|e| migration_error("check pending migrations", e))?;
                Ok(pending.iter().map(|m| m.name().to_string()).collect::<Vec<_>>())
            })
            .await?;

        if pending.is_empty() {
            println!("✓ No pending migrations found - database is up to date");
        } else {
            println!("Found {} pending migration(s):", pending.len());
            for name in &pending {
                println!("  - {}", name);
            }
            println!("\nRun without --dry-run to apply these migrations");
        }

        Ok(())
    }

    async fn run_migrations(&self) -> AppResult<()> {
        println!("Running database migrations...");

        let applied = run_pending_migrations(self.config.database.url.clone()).await?;

        if applied.is_empty() {
            println!("✓ No migrations to apply - database is already up to date");
        } else {
            println!("✓ Applied {} migration(s):", applied.len());
            for migration in &applied {
                println!("  - {}", migration);
            }
        }
        tracing::info!(applied = applied.len(), "Database migrations applied");

        Ok(())
    }

    async fn rollback_migrations(&self, steps: u32) -> AppResult<()> {
        println!("Rolling back {} migration(s)...", steps);

        let reverted = self
            .with_connection("revert migrations", move |conn| {
                let applied = conn
                    .applied_migrations()
                    .map_err(|e| migration_error("get applied migrations", e))?;

                if applied.len() < steps as usize {
                    return Err(AppError::validation(
                        "rollback_steps",
                        format!(
                            "Cannot rollback {} migrations - only {} applied migrations available",
                            steps,
                            applied.len()
                        ),
                    ));
                }

                let mut reverted = Vec::with_capacity(steps as usize);
                for _ in 0..steps {
                    let version = conn
                        .revert_last_migration(MIGRATIONS)
                        .map_err(|e| migration_error("revert migration", e))?;
                    reverted.push(version.to_string());
                }
                Ok(reverted)
            })
            .await?;

        println!("✓ Rolled back {} migration(s):", reverted.len());
        for version in &reverted {
            println!("  - {}", version);
        }
        tracing::warn!(reverted = reverted.len(), "Database migrations reverted");

        Ok(())
    }

    /// Runs `op` on a blocking connection outside the async runtime.
    async fn with_connection<T, F>(&self, operation: &'static str, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let database_url = self.config.database.url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&database_url).map_err(|e| {
                AppError::Database {
                    operation: format!("establish connection to {operation}"),
                    source: anyhow::anyhow!("Connection error: {}", e),
                }
            })?;
            op(&mut conn)
        })
        .await
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?
    }
}

fn migration_error(
    operation: &str,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> AppError {
    AppError::Database {
        operation: operation.to_string(),
        source: anyhow::anyhow!("Migration error: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/test".to_string();
        config
    }

    #[tokio::test]
    async fn test_migrate_handler_zero_rollback_steps() {
        let handler = MigrateCommandHandler::new(create_valid_config());

        let result = handler.execute(false, Some(0)).await;

        if let Err(AppError::Validation { field, reason }) = result {
            assert_eq!(field, "rollback_steps");
            assert!(reason.contains("must be greater than 0"));
        } else {
            panic!("Expected validation error for zero rollback steps");
        }
    }

    #[tokio::test]
    async fn test_migrate_handler_rejects_invalid_database_url() {
        let mut config = create_valid_config();
        config.database.url = "mysql://localhost/test".to_string();
        let handler = MigrateCommandHandler::new(config);

        let result = handler.execute(true, None).await;
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
