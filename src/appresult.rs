use axum::{
    extract::{multipart::MultipartError, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_owned())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:?}");
                "Internal Server Error".to_owned()
            }
            err => err.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

macro_rules! apperr_internal {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_internal!(sqlx::Error);
apperr_internal!(sqlx::migrate::MigrateError);
apperr_internal!(tower_sessions::session::Error);
apperr_internal!(tokio::task::JoinError);
apperr_internal!(std::io::Error);

macro_rules! apperr_rejection {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(rejection: $E) -> Self {
                Self::InvalidArgument(rejection.body_text())
            }
        }
    };
}

apperr_rejection!(JsonRejection);
apperr_rejection!(QueryRejection);
apperr_rejection!(MultipartError);
