//! # gitward-hosting
//!
//! REST clients for the repository-hosting services gitward mirrors:
//! GitHub (and GitHub Enterprise via a custom base URL) and Azure DevOps.
//!
//! # Security
//!
//! Authentication tokens are stored using `SecretString` which automatically
//! zeroizes memory when dropped, reducing credential exposure in memory dumps.

mod azure;
mod client;
mod error;
mod types;

pub use azure::AzureDevOpsClient;
pub use client::GitHubClient;
pub use error::{Error, Result};
// Re-export SecretString for constructing clients
pub use secrecy::SecretString;
pub use types::{
    Branch, CreateDeployment, CreatePullRequest, Deployment, DeploymentState, PullRequest,
    PullRequestState, Review, ReviewState,
};
