//! Error types for gitward-hosting.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during hosting-service API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication failed (bad or expired token).
    #[error("hosting API authentication failed - check the configured token")]
    AuthenticationFailed,

    /// API rate limit exceeded.
    #[error("hosting API rate limit exceeded - wait and try again")]
    RateLimited,

    /// Repository not found or no access.
    #[error("repository not found or no access: {0}")]
    RepoNotFound(String),

    /// API error with status code.
    #[error("hosting API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("failed to parse hosting API response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Error {
    /// Check if the error is a `404 Not Found` from the API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. } | Self::RepoNotFound(_))
    }
}
