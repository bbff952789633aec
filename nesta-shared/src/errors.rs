use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::clients::store::StoreError;
use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{service}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Swipe errors
/// - E2xxx: Profile errors
/// - E3xxx: Matching errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    RateLimited,
    ServiceUnavailable,
    BadRequest,

    // Swipes (E1xxx)
    InvalidDirection,
    QueueFull,
    SwipeNotFound,

    // Profiles (E2xxx)
    ProfileNotFound,
    PreferencesMissing,

    // Matching (E3xxx)
    MatchNotFound,
    MatchRollback,
    ChatNotFound,
    AlreadyMatched,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::RateLimited => "E0004",
            Self::ServiceUnavailable => "E0005",
            Self::BadRequest => "E0006",

            // Swipes
            Self::InvalidDirection => "E1001",
            Self::QueueFull => "E1002",
            Self::SwipeNotFound => "E1003",

            // Profiles
            Self::ProfileNotFound => "E2001",
            Self::PreferencesMissing => "E2002",

            // Matching
            Self::MatchNotFound => "E3001",
            Self::MatchRollback => "E3002",
            Self::ChatNotFound => "E3003",
            Self::AlreadyMatched => "E3004",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable | Self::MatchRollback => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ValidationError | Self::BadRequest | Self::InvalidDirection
            | Self::PreferencesMissing => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::SwipeNotFound | Self::ProfileNotFound
            | Self::MatchNotFound | Self::ChatNotFound => StatusCode::NOT_FOUND,
            Self::RateLimited | Self::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            Self::AlreadyMatched => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known {
                code,
                message,
                details,
            } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "store error");
                match err {
                    StoreError::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    StoreError::ThroughputExceeded => (
                        StatusCode::TOO_MANY_REQUESTS,
                        ApiErrorResponse::new("E0004", "storage throughput exceeded"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "store error"),
                    ),
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
