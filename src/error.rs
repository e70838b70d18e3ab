//! Error types for the monitor and their HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;

/// Failure reading one of the append-only progress logs.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("failed to read progress log {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure loading a persisted item metadata record.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read metadata record {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata record {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure driving the external downloader job.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("failed to spawn downloader {command:?}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        tracing::error!("Metadata lookup failed: {}", err);
        ApiError::internal("Item metadata could not be read")
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        tracing::error!("Job control failed: {}", err);
        ApiError::internal(err.to_string())
    }
}
