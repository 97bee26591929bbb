//! Error types shared by the pipeline, the job runner and the HTTP layer.
//!
//! Stage failures are never propagated past the runner: they are rendered with
//! `to_string()` and stored as the `result` of a FAILED job, so every variant
//! carries a message a human can act on.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::requests::ApiResponse;
use thiserror::Error;

/// Failures raised while streaming rows through a stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::XlsxError),

    #[error("spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("workbook has no worksheet")]
    EmptyWorkbook,

    #[error("row {row}: invalid {field} '{value}'")]
    Malformed {
        row: u64,
        field: &'static str,
        value: String,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("bulk insert failed: {0}")]
    Insert(String),

    #[error("row reader stopped unexpectedly")]
    ReaderGone,

    #[error("interrupted by shutdown")]
    Interrupted,
}

impl PipelineError {
    pub fn malformed(row: u64, field: &'static str, value: impl Into<String>) -> Self {
        PipelineError::Malformed {
            row,
            field,
            value: value.into(),
        }
    }
}

/// Reasons a job could not be handed to the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("job queue is full, try again later")]
    QueueFull,

    #[error("job runner is shutting down")]
    ShuttingDown,
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Rejected(#[from] RunnerError),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Pipeline(PipelineError::Database(err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Upload(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(self.to_string()))
    }
}
