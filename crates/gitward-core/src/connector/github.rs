//! Hosted connector: git over HTTPS with a token, REST for everything else.

use gitward_git::Credentials;
use gitward_hosting::{
    Branch, CreateDeployment, CreatePullRequest, Deployment, GitHubClient, SecretString,
};
use tracing::debug;

use super::{Connector, PullRequestTemplate, RemotePullRequest, WorkingTree};
use crate::error::Result;
use crate::mirror::RepoScope;

/// Username sent with the token for git transport.
const TOKEN_USER: &str = "x-access-token";

/// Connector for repositories hosted on GitHub.
#[derive(Debug)]
pub struct GitHubConnector {
    owner: String,
    repo: String,
    clone_url: String,
    client: GitHubClient,
    credentials: Credentials,
}

impl GitHubConnector {
    /// Create a connector for `owner/repo`.
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn new(
        owner: &str,
        repo: &str,
        token: SecretString,
        api_url: Option<&str>,
    ) -> Result<Self> {
        let client = GitHubClient::with_base_url(
            token.clone(),
            api_url.unwrap_or(GitHubClient::DEFAULT_API_URL),
        )?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            clone_url: format!("https://github.com/{owner}/{repo}.git"),
            client,
            credentials: Credentials::token(TOKEN_USER, token),
        })
    }
}

impl Connector for GitHubConnector {
    fn backend(&self) -> &'static str {
        "github"
    }

    fn scope(&self, name: &str, namespace: &str) -> RepoScope {
        RepoScope::new(name, namespace, format!("{}/{}", self.owner, self.repo))
    }

    fn clone_worktree(&self, base: &str, branch: &str) -> Result<WorkingTree> {
        WorkingTree::checkout(&self.clone_url, &self.credentials, base, branch)
    }

    fn push(&self, tree: &WorkingTree, refspec: &str) -> Result<()> {
        Ok(tree.repository().push(refspec, &self.credentials)?)
    }

    async fn open_pull_request(
        &self,
        base: &str,
        head: &str,
        template: &PullRequestTemplate,
    ) -> Result<u64> {
        let pr = self
            .client
            .create_pr(
                &self.owner,
                &self.repo,
                CreatePullRequest {
                    title: template.title.clone(),
                    body: template.body.clone(),
                    head: head.to_string(),
                    base: base.to_string(),
                    draft: false,
                },
            )
            .await?;

        if !template.reviewers.is_empty() {
            self.client
                .request_reviewers(&self.owner, &self.repo, pr.number, &template.reviewers)
                .await?;
        }
        if !template.assignees.is_empty() {
            self.client
                .add_assignees(&self.owner, &self.repo, pr.number, &template.assignees)
                .await?;
        }

        Ok(pr.number)
    }

    async fn close_pull_request(&self, id: u64) -> Result<()> {
        self.client.close_pr(&self.owner, &self.repo, id).await?;
        Ok(())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("https://github.com/{}/{}/pull/{id}.diff", self.owner, self.repo)
    }

    async fn list_pull_requests(&self) -> Result<Vec<RemotePullRequest>> {
        let prs = self
            .client
            .list_pull_requests(&self.owner, &self.repo)
            .await?;

        let mut remote = Vec::with_capacity(prs.len());
        for pr in prs {
            let reviews = self
                .client
                .list_reviews(&self.owner, &self.repo, pr.number)
                .await?;
            debug!(number = pr.number, reviews = reviews.len(), "fetched reviews");
            remote.push(RemotePullRequest {
                pull_request: pr,
                reviews,
            });
        }
        Ok(remote)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        Ok(self.client.list_branches(&self.owner, &self.repo).await?)
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        Ok(self
            .client
            .create_branch(&self.owner, &self.repo, name, sha)
            .await?)
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        Ok(self
            .client
            .list_deployments(&self.owner, &self.repo)
            .await?)
    }

    async fn create_deployment(&self, deployment: &CreateDeployment) -> Result<Deployment> {
        Ok(self
            .client
            .create_deployment(&self.owner, &self.repo, deployment)
            .await?)
    }

    async fn delete_deployment(&self, id: u64) -> Result<()> {
        Ok(self
            .client
            .delete_deployment(&self.owner, &self.repo, id)
            .await?)
    }
}
