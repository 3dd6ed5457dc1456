//! Azure DevOps connector. Deployments have no Azure Repos counterpart.

use gitward_git::Credentials;
use gitward_hosting::{
    AzureDevOpsClient, Branch, CreateDeployment, CreatePullRequest, Deployment, SecretString,
};
use tracing::{debug, warn};

use super::{Connector, PullRequestTemplate, RemotePullRequest, WorkingTree, not_implemented};
use crate::error::Result;
use crate::mirror::RepoScope;

const BACKEND: &str = "azure-devops";

/// Azure accepts any username alongside a personal access token.
const TOKEN_USER: &str = "gitward";

#[derive(Debug)]
pub struct AzureDevOpsConnector {
    organization: String,
    project: String,
    repo: String,
    client: AzureDevOpsClient,
    credentials: Credentials,
}

impl AzureDevOpsConnector {
    /// Create a connector for `organization/project/_git/repo`.
    ///
    /// # Errors
    /// Returns error if the HTTP client can't be built.
    pub fn new(
        organization: &str,
        project: &str,
        repo: &str,
        token: SecretString,
        api_url: Option<&str>,
    ) -> Result<Self> {
        let client = AzureDevOpsClient::with_base_url(
            token.clone(),
            api_url.unwrap_or(AzureDevOpsClient::DEFAULT_API_URL),
            organization,
        )?;

        Ok(Self {
            organization: organization.to_string(),
            project: project.to_string(),
            repo: repo.to_string(),
            client,
            credentials: Credentials::token(TOKEN_USER, token),
        })
    }

    fn clone_url(&self) -> String {
        format!(
            "https://dev.azure.com/{}/{}/_git/{}",
            self.organization, self.project, self.repo
        )
    }
}

impl Connector for AzureDevOpsConnector {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn scope(&self, name: &str, namespace: &str) -> RepoScope {
        RepoScope::new(name, namespace, format!("{}/{}", self.project, self.repo))
    }

    fn clone_worktree(&self, base: &str, branch: &str) -> Result<WorkingTree> {
        WorkingTree::checkout(&self.clone_url(), &self.credentials, base, branch)
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
        if !template.assignees.is_empty() {
            warn!("azure devops pull requests have no assignees; ignoring them");
        }

        let pr = self
            .client
            .create_pr(
                &self.project,
                &self.repo,
                CreatePullRequest {
                    title: template.title.clone(),
                    body: template.body.clone(),
                    head: head.to_string(),
                    base: base.to_string(),
                    draft: false,
                },
                &template.reviewers,
            )
            .await?;

        debug!(id = pr.number, "opened azure pull request");
        Ok(pr.number)
    }

    async fn close_pull_request(&self, id: u64) -> Result<()> {
        self.client
            .abandon_pr(&self.project, &self.repo, id)
            .await?;
        Ok(())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("{}/pullrequest/{id}", self.clone_url())
    }

    async fn list_pull_requests(&self) -> Result<Vec<RemotePullRequest>> {
        let prs = self
            .client
            .list_pull_requests(&self.project, &self.repo)
            .await?;

        let mut remote = Vec::with_capacity(prs.len());
        for pr in prs {
            let reviews = self
                .client
                .list_reviews(&self.project, &self.repo, pr.number)
                .await?;
            remote.push(RemotePullRequest {
                pull_request: pr,
                reviews,
            });
        }
        Ok(remote)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        Ok(self.client.list_branches(&self.project, &self.repo).await?)
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        Ok(self
            .client
            .create_branch(&self.project, &self.repo, name, sha)
            .await?)
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        not_implemented(BACKEND, "list deployments")
    }

    async fn create_deployment(&self, _deployment: &CreateDeployment) -> Result<Deployment> {
        not_implemented(BACKEND, "create deployment")
    }

    async fn delete_deployment(&self, _id: u64) -> Result<()> {
        not_implemented(BACKEND, "delete deployment")
    }
}
