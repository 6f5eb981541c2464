use axum::{extract::rejection::JsonRejection, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a write or read request can surface to its caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no authenticated identity")]
    Unauthorized,
    #[error("only the author may do that")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidState(&'static str),
    #[error("the edit window for this message has passed")]
    WindowExpired,
    #[error("{0}")]
    Validation(String),
    #[error("you cannot mark your own message as read")]
    SelfReadRejected,
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        use AppError::*;
        match self {
            Unauthorized => "unauthorized",
            Forbidden => "forbidden",
            NotFound(_) => "not-found",
            InvalidState(_) => "invalid-state",
            WindowExpired => "window-expired",
            Validation(_) => "validation-error",
            SelfReadRejected => "self-read-rejected",
            Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden | WindowExpired => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            InvalidState(_) => StatusCode::CONFLICT,
            Validation(_) => StatusCode::BAD_REQUEST,
            SelfReadRejected => StatusCode::UNPROCESSABLE_ENTITY,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!("request failed: {err:#}\n{}", err.backtrace());
        }

        (
            self.status(),
            Json(json!({ "error": self.code(), "message": self.to_string() })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(uuid::Error);
