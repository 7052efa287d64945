//! Error handling

use std::path::PathBuf;

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Message returned for every unknown or malformed customer id
pub const CUSTOMER_NOT_FOUND: &str = "Customer ID does not exist";

#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),

    // Model / explainer failures on a valid customer
    InternalError(String),
}

impl AppError {
    pub fn customer_not_found() -> Self {
        AppError::NotFound(CUSTOMER_NOT_FOUND.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "detail": detail,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        AppError::InternalError(err.to_string())
    }
}

/// Failures while reading artifacts at startup. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid customer table: {0}")]
    Table(String),

    #[error("invalid model: {0}")]
    Model(String),

    #[error("invalid explainer: {0}")]
    Explainer(String),

    #[error("invalid probability threshold {0}, expected a value in [0, 1]")]
    Threshold(f64),

    #[error("PROBA_THRESHOLD '{0}' is not a number")]
    ThresholdOverride(String),
}

/// Failures while scoring or explaining a single row
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("feature '{0}' is not numeric")]
    NonNumeric(String),

    #[error("no precomputed explanation for customer {0}")]
    MissingExplanation(i64),
}
