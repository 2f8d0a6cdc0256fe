use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("File not found")]
    FileNotFound,

    #[error("File too large")]
    PayloadTooLarge,

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::FileNotFound => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidFileName(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_)
            | AppError::IoError(_)
            | AppError::ConfigError(_)
            | AppError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description safe to show to clients. Store and filesystem details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::FileNotFound => "File not found",
            AppError::PayloadTooLarge => "File too large",
            AppError::InvalidFileName(_) => "Invalid file name",
            AppError::BadRequest(_) => "Bad request",
            AppError::DatabaseError(_) => "Database error",
            AppError::IoError(_) => "Storage error",
            AppError::ConfigError(_) => "Configuration error",
            AppError::ServerError(_) => "Server error",
        }
    }

    /// Log server-side failures before they are turned into a response.
    pub fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!("{}", self);
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let message = if status.is_server_error() {
            self.public_message().to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.public_message(),
            "message": message
        }));

        (status, body).into_response()
    }
}
