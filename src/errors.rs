use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error as StdError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Unauthorized(#[source] anyhow::Error),

    #[error("No file provided")]
    MissingFile,

    #[error("Storage write failed: {0}")]
    StorageWrite(#[source] anyhow::Error),

    #[error("Ingestion failed: {0}")]
    Ingestion(#[source] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Callers only ever see one of the fixed messages below; the
        // variant detail stays in the logs.
        let (status, error_message) = match &self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::MissingFile => (StatusCode::BAD_REQUEST, "No file provided"),
            AppError::StorageWrite(_) | AppError::Ingestion(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload video")
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        tracing::error!(
            error_type = %self,
            status_code = %status,
            "Request error"
        );

        let source_chain = collect_source_chain(&self);
        if !source_chain.is_empty() {
            tracing::error!("Error source chain:{}", source_chain);
        }

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

fn collect_source_chain(err: &AppError) -> String {
    let mut chain = String::new();
    let mut current: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(err) = current {
        chain.push_str(&format!("\n  Caused by: {}", err));
        current = err.source();
    }
    chain
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(anyhow::Error::new(err).context("SQLx operation failed"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let mut context_parts = Vec::new();

        if let Some(url) = err.url() {
            context_parts.push(format!("URL: {}", url));
        }

        if let Some(status) = err.status() {
            context_parts.push(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ));
        }

        let error_type = match &err {
            e if e.is_timeout() => "Request Timeout",
            e if e.is_connect() => "Connection Failed",
            e if e.is_decode() => "Response Decode Failed",
            e if e.is_request() => "Invalid Request",
            e if e.is_body() => "Request Body Error",
            _ => "Unknown HTTP Error",
        };
        context_parts.push(format!("Type: {}", error_type));

        let context = format!("Blob store request failed - {}", context_parts.join(", "));

        tracing::error!(
            error = %err,
            url = ?err.url(),
            status = ?err.status(),
            is_timeout = err.is_timeout(),
            is_connect = err.is_connect(),
            "HTTP request to blob store failed"
        );

        AppError::StorageWrite(anyhow::Error::new(err).context(context))
    }
}
