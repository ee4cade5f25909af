use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{LockError, X500Error};

pub const TITLE_NOT_FOUND: &str = "A title with the specified title number was not found.";
pub const CONVEYANCER_NOT_FOUND: &str = "A conveyancer with the specified conveyancer ID was not found.";
pub const EMAIL_IN_USE: &str = "Owner's email address is already in use.";
pub const TITLE_CHANGED: &str = "The title was changed by another request.";

/// Signalled by a store when a write breaks a uniqueness constraint
/// (in practice an owner email that is already taken).
#[derive(Debug, Error)]
#[error("unique constraint violated: {0}")]
pub struct UniqueViolation(pub String);

/// Signalled by a store when a change set was planned against a title that
/// has been updated since.
#[derive(Debug, Error)]
#[error("title {0} changed since it was read")]
pub struct StaleTitle(pub String);

/// Every failure a request can end in. Each variant maps to one HTTP status
/// and carries a stable machine-readable code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    NotFound {
        message: &'static str,
        code: &'static str,
    },

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{message}")]
    Conflict {
        message: String,
        code: &'static str,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("Title Number mismatch.")]
    Mismatch,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON body for every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_message: String,
    pub error_code: String,
}

impl ServiceError {
    pub fn not_found(message: &'static str, code: &'static str) -> Self {
        Self::NotFound { message, code }
    }

    pub fn email_in_use() -> Self {
        Self::Conflict {
            message: EMAIL_IN_USE.to_string(),
            code: "E003",
        }
    }

    /// Translate a store failure, keeping uniqueness violations and stale
    /// writes apart from everything else.
    pub fn from_store(err: anyhow::Error) -> Self {
        if err.downcast_ref::<UniqueViolation>().is_some() {
            Self::email_in_use()
        } else if err.downcast_ref::<StaleTitle>().is_some() {
            Self::Conflict {
                message: TITLE_CHANGED.to_string(),
                code: "E409",
            }
        } else {
            Self::Internal(err)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) | Self::Mismatch => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { code, .. } | Self::Conflict { code, .. } => *code,
            Self::ValidationFailed(_) => "E001",
            Self::Mismatch => "E004",
            Self::Forbidden(_) => "E403",
            Self::Internal(_) => "E500",
        }
    }
}

impl From<X500Error> for ServiceError {
    fn from(err: X500Error) -> Self {
        Self::ValidationFailed(err.to_string())
    }
}

impl From<LockError> for ServiceError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyLocked { .. } | LockError::NotLocked => Self::Conflict {
                message: err.to_string(),
                code: "E409",
            },
            LockError::TitleLocked { .. } => Self::Forbidden(err.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            Self::Internal(err) => {
                log::error!("Unhandled error: {:#}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error_message,
            error_code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
