//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use giro_license::protocol::{ApiErrorBody, ErrorCode};
use giro_store::StoreError;
use thiserror::Error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed license key: {0}")]
    MalformedKey(String),

    #[error("license not found")]
    NotFound,

    #[error("license already revoked")]
    AlreadyRevoked,

    #[error("license expired")]
    Expired,

    #[error("license suspended pending review")]
    Suspended,

    #[error("fingerprint does not hold a seat on this license")]
    HardwareMismatch,

    #[error("all seats on this license are bound")]
    HardwareQuotaExceeded { conflicting: Vec<String> },

    #[error("too many requests")]
    RateLimited,

    #[error("owner already holds {current} of {limit} licenses")]
    OwnerQuotaExceeded { current: u32, limit: u32 },

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedKey(_) => ErrorCode::MalformedKey,
            Self::NotFound => ErrorCode::NotFound,
            Self::AlreadyRevoked => ErrorCode::AlreadyRevoked,
            Self::Expired => ErrorCode::Expired,
            Self::Suspended => ErrorCode::Suspended,
            Self::HardwareMismatch => ErrorCode::HardwareMismatch,
            Self::HardwareQuotaExceeded { .. } => ErrorCode::HardwareQuotaExceeded,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::OwnerQuotaExceeded { .. } => ErrorCode::OwnerQuotaExceeded,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MalformedKey(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::AlreadyRevoked | Self::Expired | Self::Suspended | Self::HardwareMismatch => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::HardwareQuotaExceeded { .. } | Self::OwnerQuotaExceeded { .. } => {
                StatusCode::CONFLICT
            }
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        // Busy included: by the time it converts, the one retry already
        // happened in the service layer.
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!("request failed: {self}");
        }
        let conflicting = match &self {
            Self::HardwareQuotaExceeded { conflicting } => Some(conflicting.clone()),
            _ => None,
        };
        let body = ApiErrorBody {
            code: self.code(),
            message: self.to_string(),
            conflicting_fingerprints: conflicting,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;
