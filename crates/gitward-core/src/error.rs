//! Error types for gitward-core.

use std::path::PathBuf;

use crate::object::ObjectKey;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used to pick a response status
/// and to decide whether an error is worth retrying on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or inconsistent configuration. Never retried.
    Config,
    /// Token mismatch.
    Forbidden,
    /// Delete or get target is absent.
    NotFound,
    /// Malformed request or object.
    Invalid,
    /// The connector does not support the operation.
    NotImplemented,
    /// Git, HTTP or filesystem failure.
    Transport,
}

/// Errors that can occur in gitward-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No GitOps API resource with this name is configured.
    #[error("gitops api {namespace}/{name} not found")]
    ApiNotFound { namespace: String, name: String },

    /// No repository with this name is configured.
    #[error("repository {0} not configured")]
    RepositoryNotConfigured(String),

    /// The referenced secret does not exist.
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    /// The secret exists but lacks a required key.
    #[error("secret {secret} has no field {field}")]
    MissingSecretField { secret: String, field: &'static str },

    /// Repository URL does not match any supported connector.
    #[error("unsupported repository url: {0}")]
    UnsupportedRepository(String),

    /// A required setting is empty.
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    /// Request token did not match.
    #[error("invalid token")]
    Forbidden,

    /// The object is not stored anywhere in the tree.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectKey),

    /// Request body could not be parsed.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// A submitted object lacks its identity fields.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Template expansion failed.
    #[error("template {template:?}: {message}")]
    Template { template: String, message: String },

    /// A file under the search root is not valid YAML.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A path escapes the directory it must stay in.
    #[error("path {path} is outside {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// Capability not offered by this connector.
    #[error("{operation} is not implemented for {connector} repositories")]
    NotImplemented {
        connector: &'static str,
        operation: &'static str,
    },

    /// Creating a mirror whose name is taken.
    #[error("mirror {0} already exists")]
    MirrorExists(String),

    /// Updating a mirror that does not exist.
    #[error("mirror {0} does not exist")]
    MirrorMissing(String),

    /// A local-only branch mirror carries no head to create the branch from.
    #[error("branch mirror {0} has no head commit")]
    MissingHead(String),

    /// The commit was pushed but the pull request could not be opened.
    #[error("pushed {commit} to {branch} but failed to open pull request: {source}")]
    PullRequestFailed {
        branch: String,
        commit: String,
        #[source]
        source: Box<Error>,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(#[from] gitward_git::Error),

    /// Hosting API error.
    #[error("hosting error: {0}")]
    Hosting(#[from] gitward_hosting::Error),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ApiNotFound { .. }
            | Self::RepositoryNotConfigured(_)
            | Self::SecretNotFound { .. }
            | Self::MissingSecretField { .. }
            | Self::UnsupportedRepository(_)
            | Self::MissingSetting(_) => ErrorKind::Config,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::ObjectNotFound(_) => ErrorKind::NotFound,
            Self::InvalidBody(_)
            | Self::InvalidObject(_)
            | Self::Template { .. }
            | Self::PathOutsideRoot { .. } => ErrorKind::Invalid,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Parse { .. }
            | Self::MirrorExists(_)
            | Self::MirrorMissing(_)
            | Self::MissingHead(_)
            | Self::PullRequestFailed { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::Toml(_)
            | Self::Git(_)
            | Self::Hosting(_)
            | Self::Task(_) => ErrorKind::Transport,
        }
    }
}
