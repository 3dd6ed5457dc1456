//! Error types for gitward-git.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository has no working directory (bare clone).
    #[error("repository has no working directory")]
    BareRepository,

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// HEAD is detached (not on a branch).
    #[error("HEAD is detached - checkout a branch first")]
    DetachedHead,

    /// Remote not found.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Clone failed.
    #[error("failed to clone {url}: {message}")]
    CloneFailed { url: String, message: String },

    /// The remote rejected a pushed reference.
    #[error("push of {reference} rejected: {message}")]
    PushRejected { reference: String, message: String },

    /// Push failed before any reference was updated.
    #[error("push failed: {0}")]
    PushFailed(String),

    /// Listing remote references failed.
    #[error("failed to list remote references of {url}: {message}")]
    LsRemoteFailed { url: String, message: String },

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}
