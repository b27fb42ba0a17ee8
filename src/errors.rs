use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error type shared by the services, repositories and handlers.
/// Every variant maps to exactly one HTTP status in `into_response`.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Lookups / conflicts ─────────────────────────────────────────
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    // ── Uploads / parsing ───────────────────────────────────────────
    #[error("{0}")]
    EmptyFile(String),

    #[error("{0}")]
    InvalidFileFormat(String),

    #[error("{0}")]
    InvalidDateFormat(String),

    #[error("{0}")]
    InvalidNumberFormat(String),

    #[error("{0}")]
    InvalidStringFormat(String),

    #[error("Failed to process file: {0}")]
    FileProcessing(String),

    // ── Infrastructure ──────────────────────────────────────────────
    #[error("Failed to send email: {0}")]
    EmailSend(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_)
            | AppError::EmptyFile(_)
            | AppError::InvalidFileFormat(_)
            | AppError::InvalidDateFormat(_)
            | AppError::InvalidNumberFormat(_)
            | AppError::InvalidStringFormat(_)
            | AppError::FileProcessing(_) => StatusCode::BAD_REQUEST,
            AppError::EmailSend(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("request rejected ({}): {}", status, self);
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<bson::ser::Error> for AppError {
    fn from(e: bson::ser::Error) -> Self {
        AppError::Database(format!("cannot encode document: {e}"))
    }
}

impl From<bson::de::Error> for AppError {
    fn from(e: bson::de::Error) -> Self {
        AppError::Database(format!("cannot decode document: {e}"))
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::FileProcessing(e.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::FileProcessing(e.body_text())
    }
}
