//! Single error type surfaced across every engine and mapped to HTTP
//! responses at the facade boundary, in the same spirit as the hub's
//! `ApiError`/`ErrorResponse` split: one JSON shape for every failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("illegal transition for {entity} {id}: {from} -> {to}")]
    Conflict {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("internal error ({correlation_id}): {message}")]
    Internal {
        correlation_id: Uuid,
        message: String,
    },
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            correlation_id: Uuid::new_v4(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(
        entity: &'static str,
        id: impl std::fmt::Display,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::RepositoryUnavailable(_) => "repository_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::BAD_REQUEST,
            Self::RepositoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: "unknown".to_string(),
            },
            other => Self::RepositoryUnavailable(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal { correlation_id, message } => {
                tracing::error!(%correlation_id, %message, "internal error");
            }
            Self::RepositoryUnavailable(msg) => {
                tracing::warn!(%msg, "repository unavailable");
            }
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
