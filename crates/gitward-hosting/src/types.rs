//! Hosting-service API types.

use serde::{Deserialize, Serialize};

/// A branch as reported by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name (without `refs/heads/`).
    pub name: String,

    /// Commit SHA the branch points at.
    pub sha: String,
}

/// A pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number.
    pub number: u64,

    /// PR title.
    pub title: String,

    /// PR body/description.
    pub body: Option<String>,

    /// PR state.
    pub state: PullRequestState,

    /// Whether this is a draft PR.
    pub draft: bool,

    /// Head branch name.
    pub head_branch: String,

    /// Commit SHA of the head branch.
    pub head_sha: String,

    /// Full name (`owner/repo`) of the repository the head branch lives in.
    ///
    /// `None` when the fork was deleted.
    pub head_repo: Option<String>,

    /// Base branch name.
    pub base_branch: String,

    /// PR URL.
    pub html_url: String,

    /// URL of the unified diff.
    pub diff_url: String,

    /// Login of the PR author.
    pub author: String,

    /// Logins of users whose review was requested.
    pub requested_reviewers: Vec<String>,
}

/// State of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// PR is open.
    Open,
    /// PR was closed without merging.
    Closed,
    /// PR was merged.
    Merged,
}

/// A review left on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Login of the reviewer.
    pub author: String,

    /// Review verdict.
    pub state: ReviewState,
}

/// Verdict of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Other,
}

impl ReviewState {
    /// Check if this review approves the change.
    #[must_use]
    pub const fn is_approval(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Request to create a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequest {
    /// PR title.
    pub title: String,

    /// PR body.
    pub body: String,

    /// Head branch.
    pub head: String,

    /// Base branch.
    pub base: String,

    /// Whether to create as draft.
    pub draft: bool,
}

/// A deployment of a ref to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment id.
    pub id: u64,

    /// Deployment task name (e.g. `deploy`).
    pub task: String,

    /// Deployed ref (branch, tag or SHA).
    #[serde(rename = "ref")]
    pub ref_name: String,

    /// Commit SHA that was deployed.
    pub sha: String,

    /// Target environment.
    pub environment: String,

    /// Free-form description.
    pub description: Option<String>,

    /// API URL of the deployment.
    pub url: String,

    /// API URL listing the deployment's statuses.
    pub statuses_url: String,

    /// Data attached when the deployment was created.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Deployment {
    /// Symbolic ref recorded in the payload when a pinned SHA was deployed.
    #[must_use]
    pub fn symbolic_ref(&self) -> Option<&str> {
        self.payload.get("ref").and_then(serde_json::Value::as_str)
    }
}

/// Request to create a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDeployment {
    /// Ref to deploy.
    #[serde(rename = "ref")]
    pub ref_name: String,

    /// Deployment task name.
    pub task: String,

    /// Target environment.
    pub environment: String,

    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the service may merge the default branch into the ref first.
    pub auto_merge: bool,

    /// Status contexts that must pass; empty skips the check.
    pub required_contexts: Vec<String>,

    /// Extra data stored with the deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// State reported through a deployment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Error,
    Failure,
    Inactive,
    InProgress,
    Queued,
    Pending,
    Success,
}
