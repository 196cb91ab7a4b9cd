//! Unified error handling.
//!
//! Provides a single error type for both services that the HTTP facades
//! convert to status codes with plain-text bodies. Infrastructure failures
//! (store or channel unavailable) stay distinguishable so the email
//! consumer can decide between retrying and dead-lettering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("{0}")]
    Validation(String),

    #[error("The email {0} is already registered")]
    DuplicateEmail(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // Infrastructure
    #[error("{0} is unavailable")]
    Infrastructure(String),

    #[cfg(feature = "database")]
    #[error("Database error")]
    Database(#[from] sea_orm::DbErr),

    #[cfg(feature = "channel")]
    #[error("Event channel error")]
    Channel(#[from] redis::RedisError),

    // Internal
    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Get error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            AppError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "channel")]
            AppError::Channel(_) => "CHANNEL_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
            #[cfg(feature = "database")]
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            #[cfg(feature = "channel")]
            AppError::Channel(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure comes from the store or the channel.
    ///
    /// Such failures are transient: the request may be retried and a
    /// consumed message must not be acknowledged.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            AppError::Infrastructure(_) => true,
            #[cfg(feature = "database")]
            AppError::Database(_) => true,
            #[cfg(feature = "channel")]
            AppError::Channel(_) => true,
            _ => false,
        }
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::Validation(msg) => msg.clone(),

            // Hide details for infrastructure/internal errors
            AppError::Infrastructure(what) => {
                tracing::error!("Infrastructure unavailable: {}", what);
                "A required service is unavailable, try again later".to_string()
            }
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            #[cfg(feature = "channel")]
            AppError::Channel(e) => {
                tracing::error!("Channel error: {:?}", e);
                "A messaging error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// HTTP Response (Axum)
// =============================================================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(code = self.code(), status = status.as_u16(), "Request failed");
        (status, self.user_message()).into_response()
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NotFound(entity) => AppError::NotFound(entity),
            DomainError::DuplicateEmail(email) => AppError::DuplicateEmail(email),
            DomainError::MalformedPayload(msg) => AppError::MalformedPayload(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(entity.to_string()))
    }
}

/// Convenience constructors
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn duplicate_email(email: impl Into<String>) -> Self {
        AppError::DuplicateEmail(email.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        AppError::NotFound(entity.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        AppError::MalformedPayload(msg.into())
    }

    pub fn infrastructure(what: impl Into<String>) -> Self {
        AppError::Infrastructure(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::duplicate_email("a@x.com").status(), StatusCode::CONFLICT);
        assert_eq!(AppError::not_found("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::infrastructure("Event channel").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(AppError::infrastructure("Record store").is_infrastructure());
        assert!(!AppError::malformed("bad json").is_infrastructure());
        assert!(!AppError::duplicate_email("a@x.com").is_infrastructure());
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::internal("pool exhausted on shard 3");
        assert!(!err.user_message().contains("shard"));
    }

    #[test]
    fn test_domain_error_conversion() {
        let err: AppError = DomainError::duplicate_email("a@x.com").into();
        assert!(matches!(err, AppError::DuplicateEmail(ref e) if e == "a@x.com"));

        let err: AppError = DomainError::malformed("missing field").into();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn test_ok_or_not_found() {
        let missing: Option<u8> = None;
        let err = missing.ok_or_not_found("User").unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }
}
