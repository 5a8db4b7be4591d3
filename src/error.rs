use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::clients::ClientError;
use crate::ports::RepositoryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient stock for product {product_id}: required {required}, available {available}")]
    InsufficientStock {
        product_id: i64,
        required: i64,
        available: i64,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after: u64, limit: u64 },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal",
            AppError::BadRequest(_) => "BadRequest",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::InsufficientStock { .. } => "InsufficientStock",
            AppError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            AppError::TooManyRequests { .. } => "TooManyRequests",
        }
    }

    /// Text shown to clients. Persistence and internal failures never leak their cause.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::UpstreamUnavailable(_) => "Upstream service unavailable".to_string(),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg) => msg.clone(),
            AppError::InsufficientStock { .. } | AppError::TooManyRequests { .. } => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Database(e) => tracing::error!(error = %e, "database error"),
            AppError::Internal(e) => tracing::error!(error = %e, "internal error"),
            AppError::UpstreamUnavailable(e) => tracing::warn!(error = %e, "upstream call failed"),
            _ => {}
        }

        let mut body = json!({
            "error": self.kind(),
            "message": self.public_message(),
            "status": status.as_u16(),
        });

        match &self {
            AppError::InsufficientStock {
                product_id,
                required,
                available,
            } => {
                body["product_id"] = json!(product_id);
                body["required"] = json!(required);
                body["available"] = json!(available);
            }
            AppError::TooManyRequests { retry_after, limit } => {
                body["retry_after"] = json!(retry_after);
                body["limit"] = json!(limit);
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::TooManyRequests { retry_after, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(what) => AppError::NotFound(what),
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::InsufficientStock {
                product_id,
                required,
                available,
            } => AppError::InsufficientStock {
                product_id,
                required,
                available,
            },
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Serialization(e) => AppError::Internal(e),
        }
    }
}
