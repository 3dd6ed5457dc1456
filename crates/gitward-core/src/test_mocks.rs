//! Test doubles for the synchronizer, the connectors and the patch engine.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use gitward_hosting::{Branch, CreateDeployment, Deployment, PullRequest, Review};
use tempfile::TempDir;

use crate::connector::{Connector, PullRequestTemplate, RemotePullRequest, WorkingTree};
use crate::error::{Error, Result};
use crate::mirror::{RepoScope, Resource};
use crate::store::MirrorStore;

// === MemoryMirrorStore ===

type StoreKey = (&'static str, String, String);

/// In-memory [`MirrorStore`] that counts writes.
#[derive(Default)]
pub struct MemoryMirrorStore {
    items: Mutex<BTreeMap<StoreKey, serde_json::Value>>,
    writes: AtomicUsize,
}

impl MemoryMirrorStore {
    fn key<R: Resource>(resource: &R) -> StoreKey {
        let meta = resource.metadata();
        (R::KIND, meta.namespace.clone(), meta.name.clone())
    }

    /// Seed a mirror without counting it as a write.
    pub fn with<R: Resource>(self, resource: &R) -> Self {
        self.items.lock().unwrap().insert(
            Self::key(resource),
            serde_json::to_value(resource).unwrap(),
        );
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl MirrorStore for MemoryMirrorStore {
    fn list<R: Resource>(&self, namespace: &str, repository: &str) -> Result<Vec<R>> {
        let items = self.items.lock().unwrap();
        let mut mirrors = Vec::new();
        for ((kind, ns, _), value) in items.iter() {
            if *kind != R::KIND || ns != namespace {
                continue;
            }
            let mirror: R = serde_json::from_value(value.clone())?;
            if mirror
                .metadata()
                .labels
                .get(crate::identity::REPOSITORY_LABEL)
                .is_some_and(|r| r == repository)
            {
                mirrors.push(mirror);
            }
        }
        Ok(mirrors)
    }

    fn create<R: Resource>(&self, resource: &R) -> Result<()> {
        let key = Self::key(resource);
        let mut items = self.items.lock().unwrap();
        if items.contains_key(&key) {
            return Err(Error::MirrorExists(key.2));
        }
        items.insert(key, serde_json::to_value(resource)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update<R: Resource>(&self, resource: &R) -> Result<()> {
        let key = Self::key(resource);
        let mut items = self.items.lock().unwrap();
        if !items.contains_key(&key) {
            return Err(Error::MirrorMissing(key.2));
        }
        items.insert(key, serde_json::to_value(resource)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// === MockConnector ===

/// Connector with canned remote state that records every write.
#[derive(Default)]
pub struct MockConnector {
    branches: Mutex<Vec<Branch>>,
    pull_requests: Mutex<Vec<RemotePullRequest>>,
    deployments: Mutex<Vec<Deployment>>,
    next_pull_request_id: Mutex<u64>,
    fail_pull_requests: bool,
    fail_deployments: bool,
    created_branches: Mutex<Vec<(String, String)>>,
    opened: Mutex<Vec<(String, String, PullRequestTemplate)>>,
    open_attempts: AtomicUsize,
    deployment_calls: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            next_pull_request_id: Mutex::new(1),
            ..Self::default()
        }
    }

    pub fn with_branch(self, name: &str, sha: &str) -> Self {
        self.branches.lock().unwrap().push(Branch {
            name: name.to_string(),
            sha: sha.to_string(),
        });
        self
    }

    pub fn with_pull_request(self, pull_request: PullRequest, reviews: Vec<Review>) -> Self {
        self.pull_requests.lock().unwrap().push(RemotePullRequest {
            pull_request,
            reviews,
        });
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.deployments.lock().unwrap().push(deployment);
        self
    }

    pub fn with_next_pull_request_id(self, id: u64) -> Self {
        *self.next_pull_request_id.lock().unwrap() = id;
        self
    }

    pub fn with_pull_request_failure(mut self) -> Self {
        self.fail_pull_requests = true;
        self
    }

    pub fn with_deployment_failure(mut self) -> Self {
        self.fail_deployments = true;
        self
    }

    pub fn created_branches(&self) -> Vec<(String, String)> {
        self.created_branches.lock().unwrap().clone()
    }

    pub fn opened_pull_requests(&self) -> Vec<(String, String, PullRequestTemplate)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn deployment_calls(&self) -> Vec<String> {
        self.deployment_calls.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    fn backend(&self) -> &'static str {
        "mock"
    }

    fn scope(&self, name: &str, namespace: &str) -> RepoScope {
        RepoScope::new(name, namespace, "acme/infra")
    }

    fn clone_worktree(&self, _base: &str, _branch: &str) -> Result<WorkingTree> {
        Err(Error::NotImplemented {
            connector: "mock",
            operation: "clone",
        })
    }

    fn push(&self, _tree: &WorkingTree, _refspec: &str) -> Result<()> {
        Ok(())
    }

    async fn open_pull_request(
        &self,
        base: &str,
        head: &str,
        template: &PullRequestTemplate,
    ) -> Result<u64> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_pull_requests {
            return Err(Error::Hosting(gitward_hosting::Error::RateLimited));
        }

        let mut next = self.next_pull_request_id.lock().unwrap();
        let id = *next;
        *next += 1;
        self.opened
            .lock()
            .unwrap()
            .push((base.to_string(), head.to_string(), template.clone()));
        Ok(id)
    }

    async fn close_pull_request(&self, _id: u64) -> Result<()> {
        Ok(())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("https://github.com/acme/infra/pull/{id}.diff")
    }

    async fn list_pull_requests(&self) -> Result<Vec<RemotePullRequest>> {
        Ok(self.pull_requests.lock().unwrap().clone())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        Ok(self.branches.lock().unwrap().clone())
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        self.created_branches
            .lock()
            .unwrap()
            .push((name.to_string(), sha.to_string()));
        Ok(())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        Ok(self.deployments.lock().unwrap().clone())
    }

    async fn create_deployment(&self, request: &CreateDeployment) -> Result<Deployment> {
        self.deployment_calls
            .lock()
            .unwrap()
            .push(format!("create {}", request.ref_name));
        if self.fail_deployments {
            return Err(Error::Hosting(gitward_hosting::Error::RateLimited));
        }

        let mut deployments = self.deployments.lock().unwrap();
        let id = deployments.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        // A request carrying a payload deploys a pinned SHA.
        let sha = if request.payload.is_some() {
            request.ref_name.clone()
        } else {
            format!("sha-of-{}", request.ref_name)
        };
        let deployment = Deployment {
            id,
            task: request.task.clone(),
            ref_name: request.ref_name.clone(),
            sha,
            environment: request.environment.clone(),
            description: request.description.clone(),
            url: format!("https://api.github.com/repos/acme/infra/deployments/{id}"),
            statuses_url: format!(
                "https://api.github.com/repos/acme/infra/deployments/{id}/statuses"
            ),
            payload: request.payload.clone().unwrap_or_default(),
        };
        deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn delete_deployment(&self, id: u64) -> Result<()> {
        self.deployments.lock().unwrap().retain(|d| d.id != id);
        self.deployment_calls
            .lock()
            .unwrap()
            .push(format!("delete {id}"));
        Ok(())
    }
}

// === BareRemote ===

/// A bare repository on disk reachable through a `file://` URL.
pub struct BareRemote {
    dir: TempDir,
}

impl BareRemote {
    fn bare_path(&self) -> std::path::PathBuf {
        self.dir.path().join("remote.git")
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.bare_path().display())
    }

    /// Branch names in the remote.
    pub fn branches(&self) -> Vec<String> {
        let repo = git2::Repository::open_bare(self.bare_path()).unwrap();
        let mut names: Vec<String> = repo
            .branches(Some(git2::BranchType::Local))
            .unwrap()
            .filter_map(|b| b.ok())
            .filter_map(|(b, _)| b.name().ok().flatten().map(String::from))
            .collect();
        names.sort();
        names
    }

    /// Content of `path` at the tip of `branch`, if the file exists there.
    pub fn read(&self, branch: &str, path: &str) -> Option<String> {
        let repo = git2::Repository::open_bare(self.bare_path()).unwrap();
        let reference = repo.find_reference(&format!("refs/heads/{branch}")).ok()?;
        let tree = reference.peel_to_tree().unwrap();
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).unwrap();
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    /// Number of commits reachable from `branch`.
    pub fn commit_count(&self, branch: &str) -> usize {
        let repo = git2::Repository::open_bare(self.bare_path()).unwrap();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref(&format!("refs/heads/{branch}")).unwrap();
        walk.count()
    }

    /// Author name and message of the tip of `branch`.
    pub fn head_commit(&self, branch: &str) -> (String, String) {
        let repo = git2::Repository::open_bare(self.bare_path()).unwrap();
        let commit = repo
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .peel_to_commit()
            .unwrap();
        (
            commit.author().name().unwrap_or_default().to_string(),
            commit.message().unwrap_or_default().to_string(),
        )
    }
}

/// Create a bare remote whose `main` branch holds `files`.
pub fn bare_remote(files: &[(&str, &str)]) -> BareRemote {
    let dir = TempDir::new().unwrap();
    let bare_path = dir.path().join("remote.git");
    let seed_path = dir.path().join("seed");

    let mut bare_opts = git2::RepositoryInitOptions::new();
    bare_opts.bare(true).initial_head("main");
    git2::Repository::init_opts(&bare_path, &bare_opts).unwrap();

    let mut seed_opts = git2::RepositoryInitOptions::new();
    seed_opts.initial_head("main");
    let seed = git2::Repository::init_opts(&seed_path, &seed_opts).unwrap();

    for (path, content) in files {
        let full = seed_path.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    {
        let mut index = seed.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = seed.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Seed", "seed@example.com").unwrap();
        seed.commit(Some("refs/heads/main"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();
    }

    seed.remote("origin", bare_path.to_str().unwrap()).unwrap();
    seed.find_remote("origin")
        .unwrap()
        .push(&["refs/heads/main:refs/heads/main"], None)
        .unwrap();

    BareRemote { dir }
}
