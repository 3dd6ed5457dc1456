//! GitHub REST API client.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{
    Branch, CreateDeployment, CreatePullRequest, Deployment, DeploymentState, PullRequest,
    PullRequestState, Review, ReviewState,
};

/// Page size requested from list endpoints.
const PER_PAGE: u32 = 100;

// === Internal API response types (shared across methods) ===

/// Internal representation of a PR from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    /// GitHub returns state="closed" + `merged_at` set for merged PRs.
    merged_at: Option<String>,
    #[serde(default)]
    draft: bool,
    html_url: String,
    diff_url: String,
    head: ApiPullRequestRef,
    base: ApiPullRequestRef,
    user: ApiUser,
    #[serde(default)]
    requested_reviewers: Vec<ApiUser>,
}

/// Internal representation of a PR head/base.
#[derive(serde::Deserialize)]
struct ApiPullRequestRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
    repo: Option<ApiRepo>,
}

#[derive(serde::Deserialize)]
struct ApiRepo {
    full_name: String,
}

#[derive(serde::Deserialize)]
struct ApiUser {
    login: String,
}

impl ApiPullRequest {
    /// Convert API response to domain type, parsing state string.
    fn into_pull_request(self) -> PullRequest {
        let state = if self.merged_at.is_some() {
            PullRequestState::Merged
        } else {
            match self.state.as_str() {
                "open" => PullRequestState::Open,
                _ => PullRequestState::Closed,
            }
        };

        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body,
            state,
            draft: self.draft,
            head_branch: self.head.ref_name,
            head_sha: self.head.sha,
            head_repo: self.head.repo.map(|r| r.full_name),
            base_branch: self.base.ref_name,
            html_url: self.html_url,
            diff_url: self.diff_url,
            author: self.user.login,
            requested_reviewers: self
                .requested_reviewers
                .into_iter()
                .map(|u| u.login)
                .collect(),
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiBranch {
    name: String,
    commit: ApiCommitRef,
}

#[derive(serde::Deserialize)]
struct ApiCommitRef {
    sha: String,
}

#[derive(serde::Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    state: ReviewState,
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    /// Token stored as `SecretString` for automatic zeroization on drop.
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Create a new GitHub client.
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn new(token: SecretString) -> Result<Self> {
        Self::with_base_url(token, Self::DEFAULT_API_URL)
    }

    /// Create a new GitHub client with a custom API URL (for GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("gitward"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// GET a list endpoint, following `Link: <...>; rel="next"` to the last page.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = format!("{}{}", self.base_url, path);
        let mut items = Vec::new();
        loop {
            debug!(%url, "GET");
            let response = self
                .client
                .get(&url)
                .header(AUTHORIZATION, self.bearer())
                .send()
                .await?;
            let next = next_page(response.headers());
            let page: Vec<T> = Self::handle_response(response).await?;
            items.extend(page);

            match next {
                Some(next) => url = next,
                None => return Ok(items),
            }
        }
    }

    /// Make a POST request.
    async fn post<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer())
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make a PATCH request.
    async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "PATCH");
        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.bearer())
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make a DELETE request.
    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "DELETE");
        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(Self::error_from(response).await)
    }

    /// Handle API response.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        if response.status().is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        Err(Self::error_from(response).await)
    }

    /// Map a non-success response to an error.
    async fn error_from(response: Response) -> Error {
        let status_code = response.status().as_u16();

        match status_code {
            401 => Error::AuthenticationFailed,
            403 if response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v == "0") =>
            {
                Error::RateLimited
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Error::ApiError {
                    status: status_code,
                    message: text,
                }
            }
        }
    }

    // === Branch Operations ===

    /// List the repository's branches.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>> {
        let branches: Vec<ApiBranch> = self
            .get_all(&format!("/repos/{owner}/{repo}/branches?per_page={PER_PAGE}"))
            .await
            .map_err(|e| Self::repo_context(e, owner, repo))?;

        Ok(branches
            .into_iter()
            .map(|b| Branch {
                name: b.name,
                sha: b.commit.sha,
            })
            .collect())
    }

    /// Create a branch pointing at `sha`.
    ///
    /// # Errors
    /// Returns error if the ref already exists or API call fails.
    pub async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<()> {
        let body = serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": sha,
        });
        let _: serde_json::Value = self
            .post(&format!("/repos/{owner}/{repo}/git/refs"), &body)
            .await?;
        Ok(())
    }

    // === PR Operations ===

    /// List open pull requests.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>> {
        let prs: Vec<ApiPullRequest> = self
            .get_all(&format!(
                "/repos/{owner}/{repo}/pulls?state=open&per_page={PER_PAGE}"
            ))
            .await
            .map_err(|e| Self::repo_context(e, owner, repo))?;

        Ok(prs
            .into_iter()
            .map(ApiPullRequest::into_pull_request)
            .collect())
    }

    /// List reviews left on a pull request.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_reviews(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<Review>> {
        let reviews: Vec<ApiReview> = self
            .get_all(&format!(
                "/repos/{owner}/{repo}/pulls/{number}/reviews?per_page={PER_PAGE}"
            ))
            .await?;

        Ok(reviews
            .into_iter()
            .filter_map(|r| {
                r.user.map(|u| Review {
                    author: u.login,
                    state: r.state,
                })
            })
            .collect())
    }

    /// Create a pull request.
    ///
    /// # Errors
    /// Returns error if PR creation fails.
    pub async fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .post(&format!("/repos/{owner}/{repo}/pulls"), &pr)
            .await?;

        Ok(api_pr.into_pull_request())
    }

    /// Request reviews from the given users.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn request_reviewers(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        let body = serde_json::json!({ "reviewers": reviewers });
        let _: serde_json::Value = self
            .post(
                &format!("/repos/{owner}/{repo}/pulls/{number}/requested_reviewers"),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Assign users to a pull request.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn add_assignees(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        assignees: &[String],
    ) -> Result<()> {
        let body = serde_json::json!({ "assignees": assignees });
        let _: serde_json::Value = self
            .post(
                &format!("/repos/{owner}/{repo}/issues/{number}/assignees"),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Close a pull request without merging it.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn close_pr(&self, owner: &str, repo: &str, number: u64) -> Result<PullRequest> {
        let body = serde_json::json!({ "state": "closed" });
        let api_pr: ApiPullRequest = self
            .patch(&format!("/repos/{owner}/{repo}/pulls/{number}"), &body)
            .await?;

        Ok(api_pr.into_pull_request())
    }

    // === Deployment Operations ===

    /// List deployments.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_deployments(&self, owner: &str, repo: &str) -> Result<Vec<Deployment>> {
        self.get_all(&format!(
            "/repos/{owner}/{repo}/deployments?per_page={PER_PAGE}"
        ))
        .await
        .map_err(|e| Self::repo_context(e, owner, repo))
    }

    /// Create a deployment.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn create_deployment(
        &self,
        owner: &str,
        repo: &str,
        deployment: &CreateDeployment,
    ) -> Result<Deployment> {
        self.post(&format!("/repos/{owner}/{repo}/deployments"), deployment)
            .await
    }

    /// Report a new status for a deployment.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn create_deployment_status(
        &self,
        owner: &str,
        repo: &str,
        id: u64,
        state: DeploymentState,
    ) -> Result<()> {
        let body = serde_json::json!({ "state": state });
        let _: serde_json::Value = self
            .post(
                &format!("/repos/{owner}/{repo}/deployments/{id}/statuses"),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Delete a deployment.
    ///
    /// Only inactive deployments can be deleted, so the deployment is marked
    /// inactive first.
    ///
    /// # Errors
    /// Returns error if either API call fails.
    pub async fn delete_deployment(&self, owner: &str, repo: &str, id: u64) -> Result<()> {
        self.create_deployment_status(owner, repo, id, DeploymentState::Inactive)
            .await?;
        self.delete(&format!("/repos/{owner}/{repo}/deployments/{id}"))
            .await
    }

    fn repo_context(err: Error, owner: &str, repo: &str) -> Error {
        if err.is_not_found() {
            Error::RepoNotFound(format!("{owner}/{repo}"))
        } else {
            err
        }
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}
