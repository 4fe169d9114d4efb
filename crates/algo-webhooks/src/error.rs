//! Error types for the webhook delivery engine.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Webhook engine error variants.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The subscription store could not be queried for matches.
    #[error("Subscription lookup failed: {0}")]
    MatchLookup(String),

    /// The initial `pending` delivery row could not be persisted.
    #[error("Failed to persist delivery: {0}")]
    LedgerWrite(String),

    /// DNS, connect, or timeout failure while calling the subscriber.
    #[error("{0}")]
    Transport(String),

    /// The subscriber answered outside the 2xx range.
    #[error("HTTP {status} {reason}")]
    NonSuccessStatus { status: u16, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Delivery not found")]
    DeliveryNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Whether a delivery attempt that failed with this error should be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NonSuccessStatus { .. })
    }
}

/// JSON error response returned by the delivery history endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            WebhookError::SubscriptionNotFound => (StatusCode::NOT_FOUND, "subscription_not_found"),
            WebhookError::DeliveryNotFound => (StatusCode::NOT_FOUND, "delivery_not_found"),
            WebhookError::Database(_) | WebhookError::Migration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            WebhookError::MatchLookup(_) | WebhookError::LedgerWrite(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_and_status_errors_are_retryable() {
        assert!(WebhookError::Transport("Connection failed".into()).is_retryable());
        assert!(WebhookError::NonSuccessStatus {
            status: 503,
            reason: "Service Unavailable".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_store_errors_are_not_retryable() {
        assert!(!WebhookError::LedgerWrite("down".into()).is_retryable());
        assert!(!WebhookError::MatchLookup("down".into()).is_retryable());
        assert!(!WebhookError::Internal("bad header".into()).is_retryable());
    }

    #[test]
    fn test_non_success_status_message() {
        let err = WebhookError::NonSuccessStatus {
            status: 500,
            reason: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 Internal Server Error");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = WebhookError::DeliveryNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
