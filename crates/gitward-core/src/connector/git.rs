//! Plain git connector for `ssh://` and `file://` remotes.
//!
//! Only git transport is available, so branch listing goes through
//! `ls-remote` and every pull request, deployment and branch-creation call
//! reports `NotImplemented`.

use gitward_git::{Credentials, Repository};
use gitward_hosting::{Branch, CreateDeployment, Deployment};

use super::{Connector, PullRequestTemplate, RemotePullRequest, WorkingTree, not_implemented};
use crate::error::Result;
use crate::mirror::RepoScope;

const BACKEND: &str = "git";

#[derive(Debug)]
pub struct GitConnector {
    url: String,
    credentials: Credentials,
}

impl GitConnector {
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
        }
    }

    /// Path part of the URL without a `.git` suffix, e.g. `acme/infra`.
    fn full_name(&self) -> String {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let path = rest.split_once('/').map_or(rest, |(_, path)| path);
        path.trim_matches('/').trim_end_matches(".git").to_string()
    }
}

impl Connector for GitConnector {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn scope(&self, name: &str, namespace: &str) -> RepoScope {
        RepoScope::new(name, namespace, self.full_name())
    }

    fn clone_worktree(&self, base: &str, branch: &str) -> Result<WorkingTree> {
        WorkingTree::checkout(&self.url, &self.credentials, base, branch)
    }

    fn push(&self, tree: &WorkingTree, refspec: &str) -> Result<()> {
        Ok(tree.repository().push(refspec, &self.credentials)?)
    }

    async fn open_pull_request(
        &self,
        _base: &str,
        _head: &str,
        _template: &PullRequestTemplate,
    ) -> Result<u64> {
        not_implemented(BACKEND, "open pull request")
    }

    async fn close_pull_request(&self, _id: u64) -> Result<()> {
        not_implemented(BACKEND, "close pull request")
    }

    fn pull_request_url(&self, _id: u64) -> String {
        String::new()
    }

    async fn list_pull_requests(&self) -> Result<Vec<RemotePullRequest>> {
        not_implemented(BACKEND, "list pull requests")
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        let url = self.url.clone();
        let credentials = self.credentials.clone();
        let heads =
            tokio::task::spawn_blocking(move || Repository::ls_remote(&url, &credentials))
                .await??;
        Ok(heads
            .into_iter()
            .map(|head| Branch {
                name: head.name,
                sha: head.oid.to_string(),
            })
            .collect())
    }

    async fn create_branch(&self, _name: &str, _sha: &str) -> Result<()> {
        not_implemented(BACKEND, "create branch")
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
