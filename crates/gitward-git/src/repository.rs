//! Repository wrapper providing the working-tree operations gitward needs.

use std::cell::RefCell;
use std::path::Path;

use git2::build::RepoBuilder;
use git2::{
    BranchType, Direction, FetchOptions, IndexAddOption, Oid, PushOptions, Signature,
};
use tracing::{debug, info, instrument};

use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Name of the remote created by [`Repository::clone_branch`].
pub const ORIGIN: &str = "origin";

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Create an author identity.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A branch head advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHead {
    /// Short branch name (without `refs/heads/`).
    pub name: String,
    /// Commit the branch points at.
    pub oid: Oid,
}

/// High-level wrapper around a git repository.
pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Open a repository at the given path.
    ///
    /// # Errors
    /// Returns error if no repository found at path or any parent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::discover(path)?;
        Ok(Self { inner })
    }

    /// Clone `url` into `dest`, checking out `branch` when given (the remote
    /// default branch otherwise).
    ///
    /// # Errors
    /// Returns error if the remote can't be reached or the branch doesn't exist.
    #[instrument(skip(dest, credentials), fields(dest = %dest.as_ref().display()))]
    pub fn clone_branch(
        url: &str,
        dest: impl AsRef<Path>,
        branch: Option<&str>,
        credentials: &Credentials,
    ) -> Result<Self> {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(credentials.callbacks());

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        let inner = builder
            .clone(url, dest.as_ref())
            .map_err(|e| Error::CloneFailed {
                url: url.to_string(),
                message: e.message().to_string(),
            })?;

        info!("cloned repository");
        Ok(Self { inner })
    }

    /// List the branch heads a remote advertises, without cloning it.
    ///
    /// # Errors
    /// Returns error if the remote can't be reached.
    #[instrument(skip(credentials))]
    pub fn ls_remote(url: &str, credentials: &Credentials) -> Result<Vec<RemoteHead>> {
        let ls_failed = |e: git2::Error| Error::LsRemoteFailed {
            url: url.to_string(),
            message: e.message().to_string(),
        };

        let mut remote = git2::Remote::create_detached(url).map_err(ls_failed)?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(credentials.callbacks()), None)
            .map_err(ls_failed)?;

        let heads = connection
            .list()
            .map_err(ls_failed)?
            .iter()
            .filter_map(|head| {
                head.name()
                    .strip_prefix("refs/heads/")
                    .map(|name| RemoteHead {
                        name: name.to_string(),
                        oid: head.oid(),
                    })
            })
            .collect();

        Ok(heads)
    }

    /// Get the path to the repository root (workdir).
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    fn require_workdir(&self) -> Result<&Path> {
        self.workdir().ok_or(Error::BareRepository)
    }

    // === Branch operations ===

    /// Get the name of the current branch.
    ///
    /// # Errors
    /// Returns error if HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.inner.head()?;
        if !head.is_branch() {
            return Err(Error::DetachedHead);
        }

        head.shorthand()
            .map(String::from)
            .ok_or(Error::DetachedHead)
    }

    /// Check if a local branch exists.
    #[must_use]
    pub fn branch_exists(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    /// Create a new branch at the current HEAD.
    ///
    /// # Errors
    /// Returns error if branch creation fails.
    pub fn create_branch(&self, name: &str) -> Result<Oid> {
        let head_commit = self.inner.head()?.peel_to_commit()?;
        let branch = self.inner.branch(name, &head_commit, false)?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(name.into()))
    }

    /// Checkout a local branch.
    ///
    /// # Errors
    /// Returns error if checkout fails.
    pub fn checkout(&self, branch_name: &str) -> Result<()> {
        let branch = self
            .inner
            .find_branch(branch_name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(branch_name.into()))?;

        let object = branch.get().peel(git2::ObjectType::Commit)?;

        self.inner.checkout_tree(&object, None)?;
        self.inner.set_head(&format!("refs/heads/{branch_name}"))?;

        Ok(())
    }

    /// Check out `name`, creating it at HEAD first unless it already exists.
    ///
    /// # Errors
    /// Returns error if branch creation or checkout fails.
    pub fn checkout_new_or_existing(&self, name: &str) -> Result<()> {
        if !self.branch_exists(name) {
            debug!(branch = name, "creating working branch");
            self.create_branch(name)?;
        }
        self.checkout(name)
    }

    /// List all local branches.
    ///
    /// # Errors
    /// Returns error if branch listing fails.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let branches = self.inner.branches(Some(BranchType::Local))?;

        let names: Vec<String> = branches
            .filter_map(std::result::Result::ok)
            .filter_map(|(b, _)| b.name().ok().flatten().map(String::from))
            .collect();

        Ok(names)
    }

    // === Staging and commits ===

    /// Stage every change in the working tree, including deletions.
    ///
    /// # Errors
    /// Returns error if the index can't be updated.
    pub fn stage_all(&self) -> Result<()> {
        self.require_workdir()?;
        let mut index = self.inner.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        Ok(())
    }

    /// Check whether the index differs from HEAD.
    ///
    /// # Errors
    /// Returns error if the diff can't be computed.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let head_tree = self.inner.head()?.peel_to_tree()?;
        let index = self.inner.index()?;
        let diff = self
            .inner
            .diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Commit the staged changes on the current branch.
    ///
    /// # Errors
    /// Returns error if the tree or commit can't be written.
    pub fn create_commit(&self, message: &str, author: &Author) -> Result<Oid> {
        let signature = Signature::now(&author.name, &author.email)?;
        let mut index = self.inner.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.inner.find_tree(tree_id)?;
        let parent = self.inner.head()?.peel_to_commit()?;

        let oid = self.inner.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?;

        info!(commit = %oid, "created commit");
        Ok(oid)
    }

    /// Get the commit HEAD points at.
    ///
    /// # Errors
    /// Returns error if HEAD can't be resolved.
    pub fn head_commit(&self) -> Result<Oid> {
        Ok(self.inner.head()?.peel_to_commit()?.id())
    }

    // === Remote operations ===

    /// Push `refspec` to `origin`.
    ///
    /// A rejected reference is reported as [`Error::PushRejected`] rather
    /// than being silently ignored.
    ///
    /// # Errors
    /// Returns error if the push fails or the remote rejects an update.
    #[instrument(skip(self, credentials))]
    pub fn push(&self, refspec: &str, credentials: &Credentials) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(ORIGIN)
            .map_err(|_| Error::RemoteNotFound(ORIGIN.into()))?;

        let rejected: RefCell<Option<(String, String)>> = RefCell::new(None);

        {
            let mut callbacks = credentials.callbacks();
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejected.replace(Some((reference.to_string(), message.to_string())));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            remote
                .push(&[refspec], Some(&mut options))
                .map_err(|e| Error::PushFailed(e.message().to_string()))?;
        }

        if let Some((reference, message)) = rejected.into_inner() {
            return Err(Error::PushRejected { reference, message });
        }

        info!("pushed");
        Ok(())
    }

    // === Low-level access ===

    /// Get a reference to the underlying git2 repository.
    ///
    /// Use sparingly - prefer high-level methods.
    #[must_use]
    pub const fn inner(&self) -> &git2::Repository {
        &self.inner
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.inner.path())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Create a bare "remote" with one commit on `main` holding `README.md`.
    fn init_remote() -> (TempDir, String) {
        let temp = TempDir::new().unwrap();
        let bare_path = temp.path().join("remote.git");
        let seed_path = temp.path().join("seed");

        git2::Repository::init_bare(&bare_path).unwrap();
        let seed = git2::Repository::init(&seed_path).unwrap();
        fs::write(seed_path.join("README.md"), "hello\n").unwrap();

        {
            let mut index = seed.index().unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree = seed.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = Signature::now("Test", "test@example.com").unwrap();
            seed.commit(Some("refs/heads/main"), &sig, &sig, "Initial commit", &tree, &[])
                .unwrap();
        }

        let url = bare_path.to_str().unwrap().to_string();
        seed.remote("origin", &url).unwrap();
        seed.find_remote("origin")
            .unwrap()
            .push(&["refs/heads/main:refs/heads/main"], None)
            .unwrap();

        (temp, url)
    }

    fn author() -> Author {
        Author::new("Git Operator", "git-operator@noreply.flanksource.com")
    }

    #[test]
    fn test_clone_branch_checks_out_requested_branch() {
        let (temp, url) = init_remote();
        let repo =
            Repository::clone_branch(&url, temp.path().join("work"), Some("main"), &Credentials::None)
                .unwrap();

        assert_eq!(repo.current_branch().unwrap(), "main");
        assert!(repo.workdir().unwrap().join("README.md").exists());
    }

    #[test]
    fn test_clone_missing_branch_fails() {
        let (temp, url) = init_remote();
        let result = Repository::clone_branch(
            &url,
            temp.path().join("work"),
            Some("does-not-exist"),
            &Credentials::None,
        );

        assert!(matches!(result, Err(Error::CloneFailed { .. })));
    }

    #[test]
    fn test_checkout_new_or_existing() {
        let (temp, url) = init_remote();
        let repo =
            Repository::clone_branch(&url, temp.path().join("work"), Some("main"), &Credentials::None)
                .unwrap();

        repo.checkout_new_or_existing("automated-update").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "automated-update");

        repo.checkout_new_or_existing("main").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert!(repo.list_branches().unwrap().len() >= 2);
    }

    #[test]
    fn test_stage_all_includes_deletions() {
        let (temp, url) = init_remote();
        let repo =
            Repository::clone_branch(&url, temp.path().join("work"), Some("main"), &Credentials::None)
                .unwrap();
        let workdir = repo.workdir().unwrap().to_path_buf();

        repo.stage_all().unwrap();
        assert!(!repo.has_staged_changes().unwrap());

        fs::remove_file(workdir.join("README.md")).unwrap();
        fs::write(workdir.join("new.yaml"), "kind: ConfigMap\n").unwrap();
        repo.stage_all().unwrap();
        assert!(repo.has_staged_changes().unwrap());

        let oid = repo.create_commit("Automated Update", &author()).unwrap();
        let commit = repo.inner().find_commit(oid).unwrap();
        let tree = commit.tree().unwrap();
        assert!(tree.get_name("README.md").is_none());
        assert!(tree.get_name("new.yaml").is_some());
        assert_eq!(commit.author().name(), Some("Git Operator"));
        assert_eq!(repo.head_commit().unwrap(), oid);
    }

    #[test]
    fn test_push_updates_remote_branch() {
        let (temp, url) = init_remote();
        let repo =
            Repository::clone_branch(&url, temp.path().join("work"), Some("main"), &Credentials::None)
                .unwrap();
        let workdir = repo.workdir().unwrap().to_path_buf();

        repo.checkout_new_or_existing("feature").unwrap();
        fs::write(workdir.join("feature.txt"), "x").unwrap();
        repo.stage_all().unwrap();
        let oid = repo.create_commit("feature", &author()).unwrap();

        repo.push("+refs/heads/feature:refs/heads/feature", &Credentials::None)
            .unwrap();

        let heads = Repository::ls_remote(&url, &Credentials::None).unwrap();
        let feature = heads.iter().find(|h| h.name == "feature").unwrap();
        assert_eq!(feature.oid, oid);
        assert!(heads.iter().any(|h| h.name == "main"));
    }
}
