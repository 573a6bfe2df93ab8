use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::controller::RefreshError;
use crate::forecast::ForecastError;
use crate::repo::StoreError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NoData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PredictionError(_)
            | ApiError::PublishError(_)
            | ApiError::DatabaseError(_)
            | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::NoData(_) => "NoData",
            ApiError::PredictionError(_) => "PredictionError",
            ApiError::PublishError(_) => "PublishError",
            ApiError::DatabaseError(_) => "DatabaseError",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let (message, details) = match &self {
            ApiError::PredictionError(context) => {
                tracing::error!(error = %self, "forecast refresh aborted");
                ("Forecast prediction failed; nothing was published".to_string(), Some(context.clone()))
            }
            ApiError::PublishError(_) => {
                tracing::error!(error = %self, "forecast refresh rolled back");
                ("Publishing the forecast failed; the previous forecast is unchanged".to_string(), None)
            }
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                tracing::error!(error = %self, "API error occurred");
                ("An internal error occurred".to_string(), None)
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                (self.to_string(), None)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<RefreshError> for ApiError {
    fn from(error: RefreshError) -> Self {
        match error {
            RefreshError::NoData { .. } => ApiError::NoData(error.to_string()),
            RefreshError::InvalidParameters(msg) => ApiError::ValidationError(msg),
            RefreshError::History(e) => ApiError::DatabaseError(e.to_string()),
            RefreshError::Forecast(e @ ForecastError::Prediction { .. }) => {
                ApiError::PredictionError(e.to_string())
            }
            RefreshError::Forecast(e) => ApiError::InternalError(e.to_string()),
            RefreshError::Publish(e) => ApiError::PublishError(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::DatabaseError(error.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
