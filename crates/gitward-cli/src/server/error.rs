//! Mapping of errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gitward_core::{Error, ErrorKind};
use tracing::{error, warn};

/// Error returned by the API handlers.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// A blocking task died before answering.
    Task(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        let Self::Core(err) = self else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        if matches!(err, Error::ApiNotFound { .. }) {
            return StatusCode::NOT_FOUND;
        }

        match err.kind() {
            ErrorKind::Config | ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Transport => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Core(err) => err.to_string(),
            Self::Task(message) => message,
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), "{message}");
        } else {
            warn!(status = status.as_u16(), "{message}");
        }
        (status, message).into_response()
    }
}
