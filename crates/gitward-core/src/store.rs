//! Persistence for mirror resources.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::REPOSITORY_LABEL;
use crate::mirror::Resource;

/// Storage for mirror resources.
///
/// This trait abstracts where mirrors live, allowing the synchronizer to run
/// against the on-disk store in production and an in-memory one in tests.
#[allow(clippy::missing_errors_doc)]
pub trait MirrorStore: Send + Sync {
    /// List the mirrors of kind `R` in `namespace` labelled with `repository`.
    fn list<R: Resource>(&self, namespace: &str, repository: &str) -> Result<Vec<R>>;

    /// Store a new mirror. Fails if the name is taken.
    fn create<R: Resource>(&self, resource: &R) -> Result<()>;

    /// Replace an existing mirror. Fails if it does not exist.
    fn update<R: Resource>(&self, resource: &R) -> Result<()>;
}

fn labelled<R: Resource>(resource: &R, repository: &str) -> bool {
    resource
        .metadata()
        .labels
        .get(REPOSITORY_LABEL)
        .is_some_and(|r| r == repository)
}

/// Escape a mirror name into a single path component. Branch and ref names
/// may contain `/`.
fn file_stem(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}

/// Stores each mirror as `<root>/<namespace>/<kind>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileMirrorStore {
    root: PathBuf,
}

impl FileMirrorStore {
    const EXTENSION: &'static str = "json";

    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir<R: Resource>(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join(R::KIND)
    }

    fn path_of<R: Resource>(&self, resource: &R) -> PathBuf {
        let meta = resource.metadata();
        self.kind_dir::<R>(&meta.namespace)
            .join(format!("{}.{}", file_stem(&meta.name), Self::EXTENSION))
    }

    fn write<R: Resource>(path: &Path, resource: &R) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(resource)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl MirrorStore for FileMirrorStore {
    fn list<R: Resource>(&self, namespace: &str, repository: &str) -> Result<Vec<R>> {
        let dir = self.kind_dir::<R>(namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|e| e == Self::EXTENSION))
            .collect();
        paths.sort();

        let mut resources = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let resource: R = serde_json::from_str(&content)?;
            if labelled(&resource, repository) {
                resources.push(resource);
            }
        }

        debug!(kind = R::KIND, count = resources.len(), "listed mirrors");
        Ok(resources)
    }

    fn create<R: Resource>(&self, resource: &R) -> Result<()> {
        let path = self.path_of(resource);
        if path.exists() {
            return Err(Error::MirrorExists(resource.metadata().name.clone()));
        }
        Self::write(&path, resource)
    }

    fn update<R: Resource>(&self, resource: &R) -> Result<()> {
        let path = self.path_of(resource);
        if !path.exists() {
            return Err(Error::MirrorMissing(resource.metadata().name.clone()));
        }
        Self::write(&path, resource)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mirror::{MirrorBranch, RepoScope};
    use gitward_hosting::Branch;
    use tempfile::TempDir;

    fn branch(repo: &str, name: &str) -> MirrorBranch {
        MirrorBranch::from_remote(
            &RepoScope::new(repo, "default", format!("acme/{repo}")),
            &Branch {
                name: name.into(),
                sha: "abc123".into(),
            },
        )
    }

    #[test]
    fn test_create_and_list_by_repository() {
        let temp = TempDir::new().unwrap();
        let store = FileMirrorStore::new(temp.path());

        store.create(&branch("infra", "main")).unwrap();
        store.create(&branch("infra", "dev")).unwrap();
        store.create(&branch("apps", "main")).unwrap();

        let infra: Vec<MirrorBranch> = store.list("default", "infra").unwrap();
        assert_eq!(infra.len(), 2);
        assert!(temp.path().join("default/GitBranch/infra-main.json").exists());

        let other_ns: Vec<MirrorBranch> = store.list("prod", "infra").unwrap();
        assert!(other_ns.is_empty());
    }

    #[test]
    fn test_slash_names_stay_in_kind_dir() {
        let temp = TempDir::new().unwrap();
        let store = FileMirrorStore::new(temp.path());

        store.create(&branch("infra", "feature/x")).unwrap();
        store.create(&branch("infra", "feature%2Fx")).unwrap();

        assert!(
            temp.path()
                .join("default/GitBranch/infra-feature%2Fx.json")
                .exists()
        );
        let listed: Vec<MirrorBranch> = store.list("default", "infra").unwrap();
        let mut names: Vec<&str> = listed.iter().map(|b| b.spec.branch_name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["feature%2Fx", "feature/x"]);
    }

    #[test]
    fn test_create_rejects_existing() {
        let temp = TempDir::new().unwrap();
        let store = FileMirrorStore::new(temp.path());

        store.create(&branch("infra", "main")).unwrap();
        let result = store.create(&branch("infra", "main"));

        assert!(matches!(result, Err(Error::MirrorExists(ref n)) if n == "infra-main"));
    }

    #[test]
    fn test_update_requires_existing() {
        let temp = TempDir::new().unwrap();
        let store = FileMirrorStore::new(temp.path());
        let mut mirror = branch("infra", "main");

        assert!(matches!(
            store.update(&mirror),
            Err(Error::MirrorMissing(_))
        ));

        store.create(&mirror).unwrap();
        mirror.status.head = "def456".into();
        store.update(&mirror).unwrap();

        let listed: Vec<MirrorBranch> = store.list("default", "infra").unwrap();
        assert_eq!(listed[0].status.head, "def456");
    }
}
