//! API error type and JSON error responses

use crate::auth::StoreError;
use crate::icons::IconError;
use crate::persist::PersistError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub const PASSWORD_CHANGE_REQUIRED: &str =
    "First-time setup required: change the account password before editing the startpage.";

/// Errors surfaced by the HTTP API. Each renders as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{}", PASSWORD_CHANGE_REQUIRED)]
    PasswordChangeRequired,

    #[error("{message}")]
    Conflict {
        message: String,
        setup_required: Option<bool>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    setup_required: Option<bool>,
}

impl ApiError {
    pub fn authentication_required() -> Self {
        ApiError::Unauthenticated("Authentication required.".to_string())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("Not found.".to_string())
    }

    /// Short machine-readable kind, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::Unauthenticated(_) => "Unauthenticated",
            ApiError::PasswordChangeRequired => "PasswordChangeRequired",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::NotFound(_) => "NotFound",
            ApiError::UnsupportedFormat(_) => "UnsupportedFormat",
            ApiError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            ApiError::Internal(_) => "Internal",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::PasswordChangeRequired => StatusCode::FORBIDDEN,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} ({}): {}", status.as_u16(), self.code(), self);
        }
        let setup_required = match &self {
            ApiError::Conflict { setup_required, .. } => *setup_required,
            _ => None,
        };
        let body = ErrorBody {
            message: self.to_string(),
            setup_required,
        };

        (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidUsername | StoreError::WeakPassword => {
                ApiError::InvalidInput(err.to_string())
            }
            StoreError::AlreadyConfigured => ApiError::Conflict {
                message: err.to_string(),
                setup_required: Some(false),
            },
            StoreError::UsernameTaken => ApiError::Conflict {
                message: err.to_string(),
                setup_required: None,
            },
            StoreError::InvalidCredentials => ApiError::Unauthenticated(err.to_string()),
            StoreError::Persist(e) => {
                error!("Credential store failure: {}", e);
                ApiError::Internal("Failed to save users.".to_string())
            }
        }
    }
}

impl From<IconError> for ApiError {
    fn from(err: IconError) -> Self {
        match err {
            IconError::InvalidReference | IconError::InvalidName | IconError::UnsupportedIconSet => {
                ApiError::InvalidInput(err.to_string())
            }
            IconError::NotFound => ApiError::NotFound(err.to_string()),
            IconError::UnsupportedFormat => ApiError::UnsupportedFormat(err.to_string()),
            IconError::Upstream(msg) => ApiError::UpstreamUnavailable(msg),
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        error!("Persistence failure: {}", err);
        ApiError::Internal("Failed to save data.".to_string())
    }
}
