use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Utility for converting storage errors to structured AppError variants.
///
/// Constraint violations become field-level validation errors keyed by the
/// constraint name; everything else is propagated verbatim as a database error.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The Diesel error to convert
    /// * `operation` - Description of the database operation that failed
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info, operation)
            }
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    /// Converts a pool checkout failure.
    pub fn convert_pool_error<E>(error: E) -> AppError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AppError::ConnectionPool {
            source: anyhow::Error::from(error),
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: Box<dyn diesel::result::DatabaseErrorInformation + Send + Sync>,
        operation: &str,
    ) -> AppError {
        let message = info.message().to_string();
        let field = info
            .constraint_name()
            .or_else(|| info.column_name())
            .unwrap_or("record")
            .to_string();

        let reason = match kind {
            DatabaseErrorKind::UniqueViolation => "value already exists",
            DatabaseErrorKind::ForeignKeyViolation => "references a missing entity",
            DatabaseErrorKind::NotNullViolation => "value is required",
            DatabaseErrorKind::CheckViolation => "check constraint failed",
            _ => {
                return AppError::Database {
                    operation: operation.to_string(),
                    source: anyhow::Error::msg(format!("Database error: {}", message)),
                };
            }
        };

        tracing::debug!(%field, %message, operation, "constraint violation");
        AppError::Validation {
            field,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    struct MockDatabaseErrorInfo {
        message: String,
        constraint_name: Option<String>,
    }

    impl diesel::result::DatabaseErrorInformation for MockDatabaseErrorInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            None
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            None
        }

        fn column_name(&self) -> Option<&str> {
            None
        }

        fn constraint_name(&self) -> Option<&str> {
            self.constraint_name.as_deref()
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    #[test]
    fn test_convert_not_found_is_a_database_error() {
        let result = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "load");
        assert!(matches!(result, AppError::Database { .. }));
    }

    #[test]
    fn test_convert_check_violation_on_owner_triple() {
        let info = MockDatabaseErrorInfo {
            message: "new row for relation \"labels\" violates check constraint".to_string(),
            constraint_name: Some("labels_owner_check".to_string()),
        };
        let error = DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "insert label") {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "labels_owner_check");
                assert_eq!(reason, "check constraint failed");
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_foreign_key_violation_without_constraint() {
        let info = MockDatabaseErrorInfo {
            message: "violates foreign key constraint".to_string(),
            constraint_name: None,
        };
        let error =
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "insert subscription") {
            AppError::Validation { field, .. } => assert_eq!(field, "record"),
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_serialization_failure_is_propagated() {
        let info = MockDatabaseErrorInfo {
            message: "could not serialize access".to_string(),
            constraint_name: None,
        };
        let error =
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, Box::new(info));

        assert!(matches!(
            DatabaseErrorConverter::convert_diesel_error(error, "update family"),
            AppError::Database { .. }
        ));
    }
}
