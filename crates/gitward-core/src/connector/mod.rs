//! Connectors: one capability interface over the hosting services a
//! repository can live on.
//!
//! Both engines only talk to [`Connector`]. The variant is picked from the
//! repository URL by [`AnyConnector::from_url`].

mod azure;
mod git;
mod github;

use std::future::Future;
use std::path::Path;

use gitward_git::{Credentials, Repository};
use gitward_hosting::{Branch, CreateDeployment, Deployment, PullRequest, Review};
use tempfile::TempDir;
use tracing::info;

pub use azure::AzureDevOpsConnector;
pub use git::GitConnector;
pub use github::GitHubConnector;

use crate::error::{Error, Result};
use crate::mirror::RepoScope;
use crate::secrets::Secret;
use crate::store::MirrorStore;
use crate::sync::{self, SyncReport};

/// A private checkout used for exactly one transaction.
///
/// The checkout directory is removed when the tree is dropped.
pub struct WorkingTree {
    dir: TempDir,
    repo: Repository,
    base: String,
    branch: String,
}

impl WorkingTree {
    /// Clone `url` at `base` into a fresh temporary directory and switch to
    /// `branch`, creating it from `base` when they differ.
    ///
    /// # Errors
    /// Returns error if the clone or the checkout fails.
    pub fn checkout(url: &str, credentials: &Credentials, base: &str, branch: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("gitward-").tempdir()?;
        let repo = Repository::clone_branch(url, dir.path(), Some(base), credentials)?;
        if branch != base {
            repo.checkout_new_or_existing(branch)?;
        }
        info!(base, branch, "checked out working tree");

        Ok(Self {
            dir,
            repo,
            base: base.to_string(),
            branch: branch.to_string(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.repo
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Force-push refspec publishing the working branch under its own name.
    #[must_use]
    pub fn refspec(&self) -> String {
        format!("+refs/heads/{0}:refs/heads/{0}", self.branch)
    }
}

impl std::fmt::Debug for WorkingTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingTree")
            .field("path", &self.dir.path())
            .field("base", &self.base)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

/// Expanded pull request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestTemplate {
    pub title: String,
    pub body: String,
    pub reviewers: Vec<String>,
    pub assignees: Vec<String>,
}

/// An open pull request and the reviews left on it.
#[derive(Debug, Clone)]
pub struct RemotePullRequest {
    pub pull_request: PullRequest,
    pub reviews: Vec<Review>,
}

/// Capabilities a hosting backend offers to the synchronizer and the patch
/// orchestrator.
///
/// Git transport (`clone_worktree`, `push`) is blocking; REST calls are
/// async. Backends without a capability return [`Error::NotImplemented`].
pub trait Connector: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Scope for mirrors of this repository.
    fn scope(&self, name: &str, namespace: &str) -> RepoScope;

    // === Git transport ===

    /// Clone at `base` and check out `branch`.
    ///
    /// # Errors
    /// Returns error if the clone or checkout fails.
    fn clone_worktree(&self, base: &str, branch: &str) -> Result<WorkingTree>;

    /// Push `refspec` from `tree` to the remote.
    ///
    /// # Errors
    /// Returns error if the push fails or is rejected.
    fn push(&self, tree: &WorkingTree, refspec: &str) -> Result<()>;

    // === Pull requests ===

    /// Open a pull request from `head` into `base`, requesting reviewers and
    /// assignees. Returns the new id.
    fn open_pull_request(
        &self,
        base: &str,
        head: &str,
        template: &PullRequestTemplate,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Close a pull request without merging.
    fn close_pull_request(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    /// Browser or diff URL written back into a pull request mirror.
    fn pull_request_url(&self, id: u64) -> String;

    /// List open pull requests with their reviews.
    fn list_pull_requests(
        &self,
    ) -> impl Future<Output = Result<Vec<RemotePullRequest>>> + Send;

    // === Branches ===

    fn list_branches(&self) -> impl Future<Output = Result<Vec<Branch>>> + Send;

    fn create_branch(&self, name: &str, sha: &str) -> impl Future<Output = Result<()>> + Send;

    // === Deployments ===

    fn list_deployments(&self) -> impl Future<Output = Result<Vec<Deployment>>> + Send;

    fn create_deployment(
        &self,
        deployment: &CreateDeployment,
    ) -> impl Future<Output = Result<Deployment>> + Send;

    /// Mark a deployment inactive and delete it.
    fn delete_deployment(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    // === Reconciliation ===

    /// Reconcile branch mirrors against the remote.
    fn reconcile_branches<S: MirrorStore>(
        &self,
        store: &S,
        scope: &RepoScope,
    ) -> impl Future<Output = Result<SyncReport>> + Send {
        sync::reconcile_branches(self, store, scope)
    }

    /// Reconcile pull request mirrors against the remote.
    fn reconcile_pull_requests<S: MirrorStore>(
        &self,
        store: &S,
        scope: &RepoScope,
    ) -> impl Future<Output = Result<SyncReport>> + Send {
        sync::reconcile_pull_requests(self, store, scope)
    }

    /// Reconcile deployment mirrors against the remote.
    fn reconcile_deployments<S: MirrorStore>(
        &self,
        store: &S,
        scope: &RepoScope,
    ) -> impl Future<Output = Result<SyncReport>> + Send {
        sync::reconcile_deployments(self, store, scope)
    }
}

fn not_implemented<T>(connector: &'static str, operation: &'static str) -> Result<T> {
    Err(Error::NotImplemented {
        connector,
        operation,
    })
}

/// Settings a connector is built from.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorOptions<'a> {
    /// Repository URL (`https://github.com/...`, `https://dev.azure.com/...`,
    /// `ssh://...` or `file://...`).
    pub url: &'a str,
    /// Secret holding the credentials; unused for `file://`.
    pub secret: Option<&'a Secret>,
    /// Override for the hosting API base URL.
    pub api_url: Option<&'a str>,
}

/// Connector chosen at runtime from the repository URL.
#[derive(Debug)]
pub enum AnyConnector {
    GitHub(GitHubConnector),
    AzureDevOps(AzureDevOpsConnector),
    Git(GitConnector),
}

impl AnyConnector {
    /// Pick and build the connector for a repository URL.
    ///
    /// # Errors
    /// Returns `UnsupportedRepository` for unknown URL shapes, `MissingSetting`
    /// when a secret is required but absent, and `MissingSecretField` when the
    /// secret lacks the backend's key.
    pub fn from_url(options: ConnectorOptions<'_>) -> Result<Self> {
        let url = options.url;
        let secret = || options.secret.ok_or(Error::MissingSetting("secret"));

        if let Some(path) = url.strip_prefix("https://github.com/") {
            let (owner, repo) = path
                .trim_end_matches('/')
                .split_once('/')
                .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
                .ok_or_else(|| Error::UnsupportedRepository(url.to_string()))?;
            let repo = repo.trim_end_matches(".git");
            let token = secret()?.require("GITHUB_TOKEN")?.clone();
            return Ok(Self::GitHub(GitHubConnector::new(
                owner,
                repo,
                token,
                options.api_url,
            )?));
        }

        if let Some(path) = url.strip_prefix("https://dev.azure.com/") {
            let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
            let [organization, project, "_git", repo] = parts.as_slice() else {
                return Err(Error::UnsupportedRepository(url.to_string()));
            };
            let token = secret()?.require("AZURE_DEVOPS_TOKEN")?.clone();
            return Ok(Self::AzureDevOps(AzureDevOpsConnector::new(
                organization,
                project,
                repo,
                token,
                options.api_url,
            )?));
        }

        if url.starts_with("ssh://") {
            let secret = secret()?;
            let private_key = secret.require("SSH_PRIVATE_KEY")?.clone();
            let passphrase = secret.get("SSH_PRIVATE_KEY_PASSWORD").cloned();
            let username = url
                .trim_start_matches("ssh://")
                .split_once('@')
                .map_or("git", |(user, _)| user);
            return Ok(Self::Git(GitConnector::new(
                url,
                Credentials::SshKey {
                    username: username.to_string(),
                    private_key,
                    passphrase,
                },
            )));
        }

        if url.starts_with("file://") {
            return Ok(Self::Git(GitConnector::new(url, Credentials::None)));
        }

        Err(Error::UnsupportedRepository(url.to_string()))
    }
}

impl Connector for AnyConnector {
    fn backend(&self) -> &'static str {
        match self {
            Self::GitHub(c) => c.backend(),
            Self::AzureDevOps(c) => c.backend(),
            Self::Git(c) => c.backend(),
        }
    }

    fn scope(&self, name: &str, namespace: &str) -> RepoScope {
        match self {
            Self::GitHub(c) => c.scope(name, namespace),
            Self::AzureDevOps(c) => c.scope(name, namespace),
            Self::Git(c) => c.scope(name, namespace),
        }
    }

    fn clone_worktree(&self, base: &str, branch: &str) -> Result<WorkingTree> {
        match self {
            Self::GitHub(c) => c.clone_worktree(base, branch),
            Self::AzureDevOps(c) => c.clone_worktree(base, branch),
            Self::Git(c) => c.clone_worktree(base, branch),
        }
    }

    fn push(&self, tree: &WorkingTree, refspec: &str) -> Result<()> {
        match self {
            Self::GitHub(c) => c.push(tree, refspec),
            Self::AzureDevOps(c) => c.push(tree, refspec),
            Self::Git(c) => c.push(tree, refspec),
        }
    }

    async fn open_pull_request(
        &self,
        base: &str,
        head: &str,
        template: &PullRequestTemplate,
    ) -> Result<u64> {
        match self {
            Self::GitHub(c) => c.open_pull_request(base, head, template).await,
            Self::AzureDevOps(c) => c.open_pull_request(base, head, template).await,
            Self::Git(c) => c.open_pull_request(base, head, template).await,
        }
    }

    async fn close_pull_request(&self, id: u64) -> Result<()> {
        match self {
            Self::GitHub(c) => c.close_pull_request(id).await,
            Self::AzureDevOps(c) => c.close_pull_request(id).await,
            Self::Git(c) => c.close_pull_request(id).await,
        }
    }

    fn pull_request_url(&self, id: u64) -> String {
        match self {
            Self::GitHub(c) => c.pull_request_url(id),
            Self::AzureDevOps(c) => c.pull_request_url(id),
            Self::Git(c) => c.pull_request_url(id),
        }
    }

    async fn list_pull_requests(&self) -> Result<Vec<RemotePullRequest>> {
        match self {
            Self::GitHub(c) => c.list_pull_requests().await,
            Self::AzureDevOps(c) => c.list_pull_requests().await,
            Self::Git(c) => c.list_pull_requests().await,
        }
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        match self {
            Self::GitHub(c) => c.list_branches().await,
            Self::AzureDevOps(c) => c.list_branches().await,
            Self::Git(c) => c.list_branches().await,
        }
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        match self {
            Self::GitHub(c) => c.create_branch(name, sha).await,
            Self::AzureDevOps(c) => c.create_branch(name, sha).await,
            Self::Git(c) => c.create_branch(name, sha).await,
        }
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        match self {
            Self::GitHub(c) => c.list_deployments().await,
            Self::AzureDevOps(c) => c.list_deployments().await,
            Self::Git(c) => c.list_deployments().await,
        }
    }

    async fn create_deployment(&self, deployment: &CreateDeployment) -> Result<Deployment> {
        match self {
            Self::GitHub(c) => c.create_deployment(deployment).await,
            Self::AzureDevOps(c) => c.create_deployment(deployment).await,
            Self::Git(c) => c.create_deployment(deployment).await,
        }
    }

    async fn delete_deployment(&self, id: u64) -> Result<()> {
        match self {
            Self::GitHub(c) => c.delete_deployment(id).await,
            Self::AzureDevOps(c) => c.delete_deployment(id).await,
            Self::Git(c) => c.delete_deployment(id).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn github_secret() -> Secret {
        Secret::from_pairs("default/git", [("GITHUB_TOKEN", "ghp_abc")])
    }

    #[test]
    fn test_github_url_selects_hosted_connector() {
        let secret = github_secret();
        let connector = AnyConnector::from_url(ConnectorOptions {
            url: "https://github.com/acme/infra.git",
            secret: Some(&secret),
            api_url: None,
        })
        .unwrap();

        assert_eq!(connector.backend(), "github");
        assert_eq!(connector.scope("infra", "default").full_name, "acme/infra");
    }

    #[test]
    fn test_azure_url_selects_enterprise_connector() {
        let secret = Secret::from_pairs("default/git", [("AZURE_DEVOPS_TOKEN", "pat")]);
        let connector = AnyConnector::from_url(ConnectorOptions {
            url: "https://dev.azure.com/acme/platform/_git/config",
            secret: Some(&secret),
            api_url: None,
        })
        .unwrap();

        assert_eq!(connector.backend(), "azure-devops");
        assert_eq!(
            connector.scope("config", "default").full_name,
            "platform/config"
        );
    }

    #[test]
    fn test_ssh_and_file_urls_select_plain_connector() {
        let secret = Secret::from_pairs("default/git", [("SSH_PRIVATE_KEY", "key")]);
        let ssh = AnyConnector::from_url(ConnectorOptions {
            url: "ssh://git@example.com/acme/infra.git",
            secret: Some(&secret),
            api_url: None,
        })
        .unwrap();
        assert_eq!(ssh.backend(), "git");

        let file = AnyConnector::from_url(ConnectorOptions {
            url: "file:///srv/git/infra.git",
            secret: None,
            api_url: None,
        })
        .unwrap();
        assert_eq!(file.backend(), "git");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let secret = Secret::from_pairs("default/git", [("TOKEN", "x")]);
        let err = AnyConnector::from_url(ConnectorOptions {
            url: "https://github.com/acme/infra",
            secret: Some(&secret),
            api_url: None,
        })
        .unwrap_err();

        assert!(matches!(
            err,
            Error::MissingSecretField {
                field: "GITHUB_TOKEN",
                ..
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn test_unsupported_urls() {
        for url in [
            "https://gitlab.com/acme/infra",
            "https://github.com/acme",
            "https://dev.azure.com/acme/infra",
        ] {
            let result = AnyConnector::from_url(ConnectorOptions {
                url,
                secret: Some(&github_secret()),
                api_url: None,
            });
            assert!(
                matches!(result, Err(Error::UnsupportedRepository(_))),
                "{url}"
            );
        }
    }

    #[tokio::test]
    async fn test_plain_connector_lacks_pull_requests() {
        let connector = AnyConnector::from_url(ConnectorOptions {
            url: "file:///nonexistent",
            secret: None,
            api_url: None,
        })
        .unwrap();

        let err = connector
            .open_pull_request("main", "bump", &PullRequestTemplate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotImplemented);
    }
}
