//! API and startup error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker::BrokerError;
use domain::{DomainError, RateError};
use mailer::MailError;
use saga::SagaError;
use thiserror::Error;

use crate::config::ConfigError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Request body could not be parsed.
    BadRequest(String),
    /// Subscription saga error.
    Saga(SagaError),
    /// Rate could not be obtained.
    Rate(RateError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Rate(err) => {
                tracing::error!(error = %err, "rate unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "exchange rate unavailable".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::Domain(DomainError::InvalidEmail(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        SagaError::Domain(DomainError::DuplicateEmail(_)) => (StatusCode::CONFLICT, err.to_string()),
        _ => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<RateError> for ApiError {
    fn from(err: RateError) -> Self {
        ApiError::Rate(err)
    }
}

/// Errors that stop a service binary before it starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Domain(#[from] DomainError),

    #[error("message broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    #[error("metrics recorder error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
