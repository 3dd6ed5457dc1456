//! Finds the file an object is stored in.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::merge;
use crate::object::ObjectKey;

/// File names never searched for objects.
const KUSTOMIZATION_FILES: [&str; 2] = ["kustomization.yaml", "kustomization.yml"];

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yaml" || e == "yml")
}

fn is_kustomization(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| KUSTOMIZATION_FILES.contains(&n))
}

/// Normalize `path` relative to a tree root, refusing anything that leaves it.
///
/// # Errors
/// Returns `PathOutsideRoot` for absolute paths and paths whose `..`
/// components climb above the root.
pub fn tree_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let outside = || Error::PathOutsideRoot {
        path: path.to_path_buf(),
        root: PathBuf::from("."),
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(outside());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }
    Ok(out)
}

/// Index of objects under a search root, built lazily and kept for the
/// whole request.
#[derive(Debug)]
pub struct Locator {
    tree: PathBuf,
    search_root: PathBuf,
    index: Option<HashMap<ObjectKey, PathBuf>>,
}

impl Locator {
    /// Search `search_path` (relative to the tree) for objects.
    ///
    /// # Errors
    /// Returns `PathOutsideRoot` if the search path leaves the tree.
    pub fn new(tree: impl Into<PathBuf>, search_path: &str) -> Result<Self> {
        Ok(Self {
            tree: tree.into(),
            search_root: tree_path(search_path)?,
            index: None,
        })
    }

    /// Path, relative to the tree, of the file holding `key`.
    ///
    /// # Errors
    /// Returns `Parse` if any YAML file under the search root is malformed,
    /// even when another file holds the object.
    pub fn locate(&mut self, key: &ObjectKey) -> Result<Option<PathBuf>> {
        if self.index.is_none() {
            self.index = Some(self.build()?);
        }
        Ok(self.index.as_ref().and_then(|index| index.get(key)).cloned())
    }

    /// Remember that `key` now lives at `path`.
    pub fn record(&mut self, key: ObjectKey, path: PathBuf) {
        if let Some(index) = self.index.as_mut() {
            index.insert(key, path);
        }
    }

    /// Forget where `key` lived.
    pub fn forget(&mut self, key: &ObjectKey) {
        if let Some(index) = self.index.as_mut() {
            index.remove(key);
        }
    }

    fn build(&self) -> Result<HashMap<ObjectKey, PathBuf>> {
        let root = self.tree.join(&self.search_root);
        let mut index = HashMap::new();
        if !root.is_dir() {
            return Ok(index);
        }

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_yaml(path) || is_kustomization(path) {
                continue;
            }

            let relative = path.strip_prefix(&self.tree).unwrap_or(path).to_path_buf();
            let text = fs::read_to_string(path)?;
            let docs = merge::documents(&text).map_err(|e| Error::Parse {
                path: relative.clone(),
                message: e.to_string(),
            })?;

            for key in docs.iter().filter_map(merge::Document::key) {
                index.entry(key).or_insert_with(|| relative.clone());
            }
        }

        debug!(root = %root.display(), objects = index.len(), "indexed objects");
        Ok(index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config_map(name: &str) -> String {
        format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\n  namespace: default\n")
    }

    #[test]
    fn test_locates_object_in_multi_document_file() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "apps/config.yaml",
            &format!("{}---\n{}", config_map("a"), config_map("b")),
        );
        write(temp.path(), "kustomization.yaml", "resources:\n- apps/config.yaml\n");

        let mut locator = Locator::new(temp.path(), ".").unwrap();
        let found = locator
            .locate(&ObjectKey::new("ConfigMap", "default", "b"))
            .unwrap();

        assert_eq!(found, Some(PathBuf::from("apps/config.yaml")));
        assert_eq!(
            locator
                .locate(&ObjectKey::new("ConfigMap", "default", "missing"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_search_root_limits_walk() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "other/a.yaml", &config_map("a"));
        write(temp.path(), "apps/b.yml", &config_map("b"));

        let mut locator = Locator::new(temp.path(), "apps").unwrap();

        assert!(locator
            .locate(&ObjectKey::new("ConfigMap", "default", "a"))
            .unwrap()
            .is_none());
        assert_eq!(
            locator
                .locate(&ObjectKey::new("ConfigMap", "default", "b"))
                .unwrap(),
            Some(PathBuf::from("apps/b.yml"))
        );
    }

    #[test]
    fn test_malformed_file_fails_lookup() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.yaml", &config_map("a"));
        write(temp.path(), "broken.yaml", "kind: [unclosed\n");

        let mut locator = Locator::new(temp.path(), ".").unwrap();
        let err = locator
            .locate(&ObjectKey::new("ConfigMap", "default", "a"))
            .unwrap_err();

        assert!(matches!(err, Error::Parse { ref path, .. } if path == Path::new("broken.yaml")));
    }

    #[test]
    fn test_record_and_forget() {
        let temp = TempDir::new().unwrap();
        let key = ObjectKey::new("ConfigMap", "default", "new");
        let mut locator = Locator::new(temp.path(), ".").unwrap();

        assert!(locator.locate(&key).unwrap().is_none());
        locator.record(key.clone(), PathBuf::from("new.yaml"));
        assert_eq!(locator.locate(&key).unwrap(), Some(PathBuf::from("new.yaml")));
        locator.forget(&key);
        assert!(locator.locate(&key).unwrap().is_none());
    }

    #[test]
    fn test_tree_path_rejects_escape() {
        assert_eq!(tree_path("./a/../b/c.yaml").unwrap(), PathBuf::from("b/c.yaml"));
        assert!(tree_path("../etc/passwd").is_err());
        assert!(tree_path("/etc/passwd").is_err());
    }
}
