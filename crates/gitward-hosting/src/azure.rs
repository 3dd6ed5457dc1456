//! Azure DevOps REST API client.
//!
//! Covers the git refs and pull request endpoints of a single organization.
//! Authentication uses a personal access token sent as the basic-auth password.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Branch, CreatePullRequest, PullRequest, PullRequestState, Review, ReviewState};

const API_VERSION: &str = "7.0";

/// Object id Azure expects as `oldObjectId` when a ref is created.
const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// Reviewer vote meaning "approved".
const VOTE_APPROVED: i32 = 10;
/// Reviewer vote meaning "approved with suggestions".
const VOTE_APPROVED_WITH_SUGGESTIONS: i32 = 5;
/// Reviewer vote meaning "rejected".
const VOTE_REJECTED: i32 = -10;

/// Azure wraps every collection in `{ "count": n, "value": [...] }`.
#[derive(serde::Deserialize)]
struct ApiList<T> {
    value: Vec<T>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRef {
    name: String,
    object_id: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiIdentity {
    unique_name: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiReviewer {
    unique_name: String,
    #[serde(default)]
    vote: i32,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCommit {
    commit_id: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPullRequest {
    pull_request_id: u64,
    title: String,
    description: Option<String>,
    status: String,
    #[serde(default)]
    is_draft: bool,
    source_ref_name: String,
    target_ref_name: String,
    created_by: ApiIdentity,
    #[serde(default)]
    reviewers: Vec<ApiReviewer>,
    last_merge_source_commit: Option<ApiCommit>,
}

fn strip_heads(name: &str) -> String {
    name.strip_prefix("refs/heads/").unwrap_or(name).to_string()
}

fn heads(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

/// Azure DevOps API client scoped to one organization.
pub struct AzureDevOpsClient {
    client: Client,
    /// `https://dev.azure.com/<organization>`
    base_url: String,
    token: SecretString,
}

impl AzureDevOpsClient {
    /// Default Azure DevOps service URL.
    pub const DEFAULT_API_URL: &'static str = "https://dev.azure.com";

    /// Create a client for `organization` on the public service.
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn new(token: SecretString, organization: &str) -> Result<Self> {
        Self::with_base_url(token, Self::DEFAULT_API_URL, organization)
    }

    /// Create a client against a custom service URL.
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn with_base_url(
        token: SecretString,
        base_url: impl Into<String>,
        organization: &str,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("gitward"));

        let client = Client::builder().default_headers(headers).build()?;
        let base_url = format!(
            "{}/{organization}",
            base_url.into().trim_end_matches('/')
        );

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn repo_url(&self, project: &str, repo: &str, rest: &str) -> String {
        let sep = if rest.contains('?') { '&' } else { '?' };
        format!(
            "{}/{project}/_apis/git/repositories/{repo}/{rest}{sep}api-version={API_VERSION}",
            self.base_url
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth("", Some(self.token.expose_secret()))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "GET");
        let response = self.authed(self.client.get(url)).send().await?;
        Self::handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(%url, "POST");
        let response = self.authed(self.client.post(url)).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(%url, "PATCH");
        let response = self
            .authed(self.client.patch(url))
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        // An unauthenticated call is answered with 203 and a sign-in page.
        if status.is_success() && status.as_u16() != 203 {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        match status.as_u16() {
            401 | 203 => Err(Error::AuthenticationFailed),
            429 => Err(Error::RateLimited),
            code => {
                let message = response.text().await.unwrap_or_default();
                Err(Error::ApiError {
                    status: code,
                    message,
                })
            }
        }
    }

    fn pull_request_url(&self, project: &str, repo: &str, id: u64) -> String {
        format!("{}/{project}/_git/{repo}/pullrequest/{id}", self.base_url)
    }

    fn pull_request_from(&self, project: &str, repo: &str, pr: ApiPullRequest) -> PullRequest {
        let state = match pr.status.as_str() {
            "active" => PullRequestState::Open,
            "completed" => PullRequestState::Merged,
            _ => PullRequestState::Closed,
        };
        let html_url = self.pull_request_url(project, repo, pr.pull_request_id);

        PullRequest {
            number: pr.pull_request_id,
            title: pr.title,
            body: pr.description,
            state,
            draft: pr.is_draft,
            head_branch: strip_heads(&pr.source_ref_name),
            head_sha: pr
                .last_merge_source_commit
                .map(|c| c.commit_id)
                .unwrap_or_default(),
            head_repo: None,
            base_branch: strip_heads(&pr.target_ref_name),
            diff_url: html_url.clone(),
            html_url,
            author: pr.created_by.unique_name,
            requested_reviewers: pr.reviewers.into_iter().map(|r| r.unique_name).collect(),
        }
    }

    // === Ref Operations ===

    /// List branches (`refs/heads/*`).
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_branches(&self, project: &str, repo: &str) -> Result<Vec<Branch>> {
        let refs: ApiList<ApiRef> = self
            .get(&self.repo_url(project, repo, "refs?filter=heads/"))
            .await?;

        Ok(refs
            .value
            .into_iter()
            .map(|r| Branch {
                name: strip_heads(&r.name),
                sha: r.object_id,
            })
            .collect())
    }

    /// Create a branch at `sha`.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn create_branch(
        &self,
        project: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<()> {
        let body = serde_json::json!([{
            "name": heads(branch),
            "oldObjectId": ZERO_OID,
            "newObjectId": sha,
        }]);
        let _: serde_json::Value = self
            .post(&self.repo_url(project, repo, "refs"), &body)
            .await?;
        Ok(())
    }

    // === PR Operations ===

    /// List active pull requests.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_pull_requests(&self, project: &str, repo: &str) -> Result<Vec<PullRequest>> {
        let prs: ApiList<ApiPullRequest> = self
            .get(&self.repo_url(
                project,
                repo,
                "pullrequests?searchCriteria.status=active",
            ))
            .await?;

        Ok(prs
            .value
            .into_iter()
            .map(|pr| self.pull_request_from(project, repo, pr))
            .collect())
    }

    /// List reviewer votes as reviews.
    ///
    /// Reviewers who have not voted yet are skipped.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_reviews(&self, project: &str, repo: &str, id: u64) -> Result<Vec<Review>> {
        let reviewers: ApiList<ApiReviewer> = self
            .get(&self.repo_url(project, repo, &format!("pullrequests/{id}/reviewers")))
            .await?;

        Ok(reviewers
            .value
            .into_iter()
            .filter(|r| r.vote != 0)
            .map(|r| Review {
                author: r.unique_name,
                state: match r.vote {
                    VOTE_APPROVED | VOTE_APPROVED_WITH_SUGGESTIONS => ReviewState::Approved,
                    VOTE_REJECTED => ReviewState::ChangesRequested,
                    _ => ReviewState::Other,
                },
            })
            .collect())
    }

    /// Create a pull request.
    ///
    /// An empty title defaults to the head branch name, since Azure rejects it.
    /// `reviewers` are Azure identity ids.
    ///
    /// # Errors
    /// Returns error if PR creation fails.
    pub async fn create_pr(
        &self,
        project: &str,
        repo: &str,
        pr: CreatePullRequest,
        reviewers: &[String],
    ) -> Result<PullRequest> {
        let title = if pr.title.is_empty() {
            pr.head.clone()
        } else {
            pr.title
        };
        let body = serde_json::json!({
            "sourceRefName": heads(&pr.head),
            "targetRefName": heads(&pr.base),
            "title": title,
            "description": pr.body,
            "isDraft": pr.draft,
            "reviewers": reviewers
                .iter()
                .map(|id| serde_json::json!({ "id": id }))
                .collect::<Vec<_>>(),
        });

        let created: ApiPullRequest = self
            .post(&self.repo_url(project, repo, "pullrequests"), &body)
            .await?;
        Ok(self.pull_request_from(project, repo, created))
    }

    /// Abandon a pull request.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn abandon_pr(&self, project: &str, repo: &str, id: u64) -> Result<PullRequest> {
        let body = serde_json::json!({ "status": "abandoned" });
        let updated: ApiPullRequest = self
            .patch(&self.repo_url(project, repo, &format!("pullrequests/{id}")), &body)
            .await?;
        Ok(self.pull_request_from(project, repo, updated))
    }
}

impl std::fmt::Debug for AzureDevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPO_PATH: &str = "/acme/infra/_apis/git/repositories/config";

    fn test_client(base_url: &str) -> AzureDevOpsClient {
        AzureDevOpsClient::with_base_url(SecretString::from("pat"), base_url, "acme").unwrap()
    }

    fn pr_json(id: u64, status: &str) -> serde_json::Value {
        serde_json::json!({
            "pullRequestId": id,
            "title": "Bump replicas",
            "description": "More pods",
            "status": status,
            "isDraft": false,
            "sourceRefName": "refs/heads/bump",
            "targetRefName": "refs/heads/main",
            "createdBy": { "uniqueName": "alice@acme.com" },
            "reviewers": [{ "uniqueName": "bob@acme.com", "vote": 10 }],
            "lastMergeSourceCommit": { "commitId": "abc123" }
        })
    }

    #[tokio::test]
    async fn test_list_branches_strips_prefix() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{REPO_PATH}/refs")))
            .and(query_param("filter", "heads/"))
            .and(query_param("api-version", "7.0"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "value": [{ "name": "refs/heads/main", "objectId": "abc123" }]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let branches = client.list_branches("infra", "config").await.unwrap();

        assert_eq!(
            branches,
            vec![Branch {
                name: "main".into(),
                sha: "abc123".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_create_branch_sends_zero_old_object() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{REPO_PATH}/refs")))
            .and(body_json(serde_json::json!([{
                "name": "refs/heads/feature-x",
                "oldObjectId": ZERO_OID,
                "newObjectId": "abc123"
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1, "value": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        client
            .create_branch("infra", "config", "feature-x", "abc123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_pull_requests() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{REPO_PATH}/pullrequests")))
            .and(query_param("searchCriteria.status", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "value": [pr_json(12, "active")]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let prs = client.list_pull_requests("infra", "config").await.unwrap();

        assert_eq!(prs.len(), 1);
        let pr = &prs[0];
        assert_eq!(pr.state, PullRequestState::Open);
        assert_eq!(pr.head_branch, "bump");
        assert_eq!(pr.base_branch, "main");
        assert_eq!(pr.head_sha, "abc123");
        assert!(pr.html_url.ends_with("/acme/infra/_git/config/pullrequest/12"));
    }

    #[tokio::test]
    async fn test_create_pr_defaults_title_to_head() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{REPO_PATH}/pullrequests")))
            .and(body_partial_json(serde_json::json!({
                "title": "bump",
                "sourceRefName": "refs/heads/bump",
                "targetRefName": "refs/heads/main"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(pr_json(13, "active")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let pr = client
            .create_pr(
                "infra",
                "config",
                CreatePullRequest {
                    title: String::new(),
                    body: String::new(),
                    head: "bump".into(),
                    base: "main".into(),
                    draft: false,
                },
                &[],
            )
            .await
            .unwrap();

        assert_eq!(pr.number, 13);
    }

    #[tokio::test]
    async fn test_list_reviews_maps_votes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{REPO_PATH}/pullrequests/12/reviewers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 3,
                "value": [
                    { "uniqueName": "bob@acme.com", "vote": 10 },
                    { "uniqueName": "carol@acme.com", "vote": 0 },
                    { "uniqueName": "dave@acme.com", "vote": -10 }
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let reviews = client.list_reviews("infra", "config", 12).await.unwrap();

        assert_eq!(reviews.len(), 2);
        assert!(reviews[0].state.is_approval());
        assert_eq!(reviews[1].state, ReviewState::ChangesRequested);
    }

    #[tokio::test]
    async fn test_abandon_pr() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(format!("{REPO_PATH}/pullrequests/12")))
            .and(body_partial_json(serde_json::json!({ "status": "abandoned" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(12, "abandoned")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let pr = client.abandon_pr("infra", "config", 12).await.unwrap();

        assert_eq!(pr.state, PullRequestState::Closed);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{REPO_PATH}/refs")))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client.list_branches("infra", "config").await;

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }
}
