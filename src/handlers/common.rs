use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::warn;
use validator::Validate;

use crate::{errors::ServiceError, ApiResponse};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Success response with a human-readable message
pub fn success_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    (
        StatusCode::CREATED,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// JSON body extractor that reports malformed or mistyped bodies with the
/// standard error envelope instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                warn!(status = %rejection.status(), %message, "request body rejected");
                Err(ServiceError::validation(message))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Accepts an integer sent either as a JSON number or as a numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, found \"{}\"", text))),
    }
}
