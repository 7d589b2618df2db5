use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Validation error: qty_completed exceeds the remaining target quantity",
    "max_allowed": 60,
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Largest quantity the rejected request could have used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_allowed: Option<i64>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        max_allowed: Option<i64>,
    },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::validation(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationError {
            message: message.into(),
            max_allowed: None,
        }
    }

    /// Validation failure that carries the computed ceiling for the rejected quantity.
    pub fn exceeds(message: impl Into<String>, max_allowed: i64) -> Self {
        ServiceError::ValidationError {
            message: message.into(),
            max_allowed: Some(max_allowed),
        }
    }

    pub fn max_allowed(&self) -> Option<i64> {
        match self {
            Self::ValidationError { max_allowed, .. } => *max_allowed,
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError { .. } | Self::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) | Self::StorageError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::StorageError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            max_allowed: self.max_allowed(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            ServiceError::NotFound("po".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Forbidden("no access".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::InvalidTransition("draft required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::exceeds("too much", 60).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::db_error(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::db_error(DbErr::Custom("connection reset by peer".into()));
        assert_eq!(err.response_message(), "Database error");
        let err = ServiceError::StorageError("/var/uploads is read-only".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[tokio::test]
    async fn validation_error_body_carries_ceiling() {
        let response = ServiceError::exceeds("qty_completed too large", 60).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["max_allowed"], 60);
        assert_eq!(json["error"], "Bad Request");
    }
}
