//! HTTP mapping of [`AppError`].
//!
//! Collaborators exposing handlers over HTTP return `AppError` directly from
//! axum handlers; this module decides the status code and the JSON body.
//! Infrastructure failures are sanitized so storage details never leak.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::AppError;

/// Status used when the client went away before the request completed.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Standard error response format.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl AppError {
    /// HTTP status for this error.
    ///
    /// # Status Code Mapping
    /// - NotFound → 404
    /// - Forbidden, SystemImmutable, OnlyOwnerCanEditFamily → 403
    /// - Validation, ValidationErrors, CannotInviteUser, BadInvitationCode → 400
    /// - LimitReached → 402
    /// - FamilyAlreadyExists, StaleEntity → 409
    /// - Canceled → 499
    /// - ConnectionPool → 503
    /// - everything else → 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Forbidden { .. }
            | AppError::SystemImmutable { .. }
            | AppError::OnlyOwnerCanEditFamily => StatusCode::FORBIDDEN,
            AppError::Validation { .. }
            | AppError::ValidationErrors { .. }
            | AppError::CannotInviteUser { .. }
            | AppError::BadInvitationCode => StatusCode::BAD_REQUEST,
            AppError::LimitReached { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::FamilyAlreadyExists | AppError::StaleEntity { .. } => StatusCode::CONFLICT,
            AppError::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::CannotGetQuotaOnFeature { .. }
            | AppError::Database { .. }
            | AppError::Configuration { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Forbidden { .. } => "FORBIDDEN",
            AppError::SystemImmutable { .. } => "SYSTEM_IMMUTABLE",
            AppError::OnlyOwnerCanEditFamily => "ONLY_OWNER_CAN_EDIT_FAMILY",
            AppError::Validation { .. } | AppError::ValidationErrors { .. } => "VALIDATION_ERROR",
            AppError::CannotInviteUser { .. } => "CANNOT_INVITE_USER",
            AppError::BadInvitationCode => "BAD_INVITATION_CODE",
            AppError::LimitReached { .. } => "LIMIT_REACHED",
            AppError::CannotGetQuotaOnFeature { .. } => "CANNOT_GET_QUOTA_ON_FEATURE",
            AppError::FamilyAlreadyExists => "FAMILY_ALREADY_EXISTS",
            AppError::StaleEntity { .. } => "STALE_ENTITY",
            AppError::Canceled => "CANCELED",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::Configuration { .. } => "CONFIGURATION_ERROR",
            AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Response body for this error.
    pub fn to_error_response(&self) -> ErrorResponse {
        let response = ErrorResponse::new(self.error_code(), self.to_string());
        match self {
            AppError::NotFound { entity, id } => {
                response.with_details(json!({ "entity": entity, "id": id }))
            }
            AppError::SystemImmutable { entity } => {
                response.with_details(json!({ "entity": entity }))
            }
            AppError::Validation { field, reason } => {
                response.with_details(json!([{ "field": field, "message": reason }]))
            }
            AppError::ValidationErrors { errors } => response.with_details(json!(errors)),
            AppError::LimitReached { feature, limit } => {
                response.with_details(json!({ "feature": feature, "limit": limit }))
            }
            AppError::StaleEntity { entity, id } => {
                response.with_details(json!({ "entity": entity, "id": id }))
            }
            AppError::Database { operation, .. } => ErrorResponse::new(
                self.error_code(),
                format!("Database operation failed: {operation}"),
            ),
            AppError::Configuration { .. } | AppError::Internal { .. } => {
                ErrorResponse::new(self.error_code(), "An internal error occurred")
            }
            AppError::ConnectionPool { .. } => {
                ErrorResponse::new(self.error_code(), "Database connection unavailable")
            }
            _ => response,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;
    use crate::models::Feature;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::label_not_found("x"), 404),
            (AppError::forbidden("no"), 403),
            (
                AppError::SystemImmutable {
                    entity: EntityKind::Label,
                },
                403,
            ),
            (AppError::OnlyOwnerCanEditFamily, 403),
            (AppError::validation("name", "too short"), 400),
            (AppError::BadInvitationCode, 400),
            (
                AppError::LimitReached {
                    feature: Feature::FamilyMembersCount,
                    limit: 2,
                },
                402,
            ),
            (AppError::FamilyAlreadyExists, 409),
            (AppError::stale(EntityKind::Family, "f"), 409),
            (AppError::Canceled, 499),
            (
                AppError::ConnectionPool {
                    source: anyhow::anyhow!("timeout"),
                },
                503,
            ),
            (AppError::internal("boom"), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{error}");
        }
    }

    #[test]
    fn test_limit_body_names_the_feature() {
        let body = AppError::LimitReached {
            feature: Feature::CustomLabelsCount,
            limit: 10,
        }
        .to_error_response();
        assert_eq!(body.code, "LIMIT_REACHED");
        let details = body.details.unwrap();
        assert_eq!(details["feature"], "custom_labels_count");
        assert_eq!(details["limit"], 10);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let body = AppError::Database {
            operation: "save family".to_string(),
            source: anyhow::anyhow!("password authentication failed"),
        }
        .to_error_response();
        assert!(!body.message.contains("password"));
        assert!(body.details.is_none());

        let response = AppError::internal("secret").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
