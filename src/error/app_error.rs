use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::error::DatabaseErrorConverter;
use crate::models::Feature;

/// Kind of domain entity referenced by an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Family,
    FamilyMember,
    Subscription,
    Provider,
    Label,
    Account,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Family => "family",
            EntityKind::FamilyMember => "family_member",
            EntityKind::Subscription => "subscription",
            EntityKind::Provider => "provider",
            EntityKind::Label => "label",
            EntityKind::Account => "account",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

/// Application-wide error type that represents all possible errors in the system.
///
/// Domain variants are sentinels: command handlers surface the first one they
/// hit and never recover from it. Infrastructure variants carry their source.
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity absent, or not part of the caller's scoped view
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// Caller is not allowed to perform the operation
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Mutation attempted on a built-in (system owned) entity
    #[error("{entity} is owned by the system and cannot be modified")]
    SystemImmutable { entity: EntityKind },

    /// Plan quota exhausted for the given feature
    #[error("Limit reached for {feature}: {limit}")]
    LimitReached { feature: Feature, limit: i64 },

    /// Quota requested on a capability feature
    #[error("Feature {feature} is not a quota")]
    CannotGetQuotaOnFeature { feature: Feature },

    /// Aggregate or input validation failed on one or more fields
    #[error("Validation failed: {}", format_field_errors(.errors))]
    ValidationErrors { errors: Vec<ValidationFieldError> },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Only the family owner can edit the family")]
    OnlyOwnerCanEditFamily,

    #[error("Cannot invite user: {reason}")]
    CannotInviteUser { reason: String },

    #[error("Bad invitation code")]
    BadInvitationCode,

    #[error("User already belongs to a family")]
    FamilyAlreadyExists,

    /// Optimistic concurrency failure: the entity changed since it was loaded
    #[error("{entity} {id} was modified concurrently")]
    StaleEntity { entity: EntityKind, id: String },

    /// Request context was canceled before the operation completed
    #[error("Operation canceled")]
    Canceled,

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

fn format_field_errors(errors: &[ValidationFieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn family_not_found(id: impl ToString) -> Self {
        Self::not_found(EntityKind::Family, id)
    }

    pub fn family_member_not_found(id: impl ToString) -> Self {
        Self::not_found(EntityKind::FamilyMember, id)
    }

    pub fn subscription_not_found(id: impl ToString) -> Self {
        Self::not_found(EntityKind::Subscription, id)
    }

    pub fn provider_not_found(id: impl ToString) -> Self {
        Self::not_found(EntityKind::Provider, id)
    }

    pub fn label_not_found(id: impl ToString) -> Self {
        Self::not_found(EntityKind::Label, id)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn stale(entity: EntityKind, id: impl ToString) -> Self {
        AppError::StaleEntity {
            entity,
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        AppError::Internal {
            source: anyhow::anyhow!("{}", message),
        }
    }

    /// True for the not-found family of sentinels.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<diesel_async::pooled_connection::bb8::RunError> for AppError {
    fn from(error: diesel_async::pooled_connection::bb8::RunError) -> Self {
        DatabaseErrorConverter::convert_pool_error(error)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<ValidationFieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| ValidationFieldError {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        // HashMap iteration order is unstable
        fields.sort_by(|a, b| a.field.cmp(&b.field).then(a.message.cmp(&b.message)));
        AppError::ValidationErrors { errors: fields }
    }
}

impl From<crate::config::error::ConfigError> for AppError {
    fn from(error: crate::config::error::ConfigError) -> Self {
        AppError::Configuration {
            key: error.field().unwrap_or("settings").to_string(),
            source: anyhow::Error::from(error),
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::{ValidationError, ValidationErrors};

    #[test]
    fn test_not_found_helpers_carry_entity() {
        let err = AppError::family_not_found("f-1");
        match err {
            AppError::NotFound { entity, id } => {
                assert_eq!(entity, EntityKind::Family);
                assert_eq!(id, "f-1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(AppError::label_not_found("x").is_not_found());
        assert!(!AppError::Canceled.is_not_found());
    }

    #[test]
    fn test_validation_errors_are_flattened_and_sorted() {
        let mut errors = ValidationErrors::new();
        errors.add("name", ValidationError::new("length").with_message("too short".into()));
        errors.add("color", ValidationError::new("color"));

        let err = AppError::from(errors);
        match err {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "color");
                assert_eq!(errors[0].message, "color");
                assert_eq!(errors[1].field, "name");
                assert_eq!(errors[1].message, "too short");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = AppError::LimitReached {
            feature: Feature::FamilyMembersCount,
            limit: 2,
        };
        assert_eq!(err.to_string(), "Limit reached for family_members_count: 2");
        assert_eq!(
            AppError::stale(EntityKind::Label, "abc").to_string(),
            "label abc was modified concurrently"
        );
    }
}
