//! Maintains the `resources:` list of a `kustomization.yaml`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Error, Result};

pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

const RESOURCES: &str = "resources";

/// A kustomization file loaded from a working tree.
///
/// The whole document is kept so that fields other than `resources` survive
/// a rewrite.
#[derive(Debug, Clone)]
pub struct Kustomization {
    /// Relative to the tree root.
    path: PathBuf,
    doc: Mapping,
    resources: Vec<String>,
    changed: bool,
}

impl Kustomization {
    /// Load `path` (relative to `tree`). A missing file loads as empty and
    /// is created on [`save`](Self::save).
    ///
    /// # Errors
    /// Returns `Parse` if the file exists but is not a YAML mapping.
    pub fn load(tree: &Path, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let full = tree.join(&path);

        let doc = if full.exists() {
            let text = fs::read_to_string(&full)?;
            let parse_error = |message: String| Error::Parse {
                path: path.clone(),
                message,
            };
            match serde_yaml::from_str::<Value>(&text).map_err(|e| parse_error(e.to_string()))? {
                Value::Mapping(doc) => doc,
                Value::Null => Mapping::new(),
                _ => return Err(parse_error("kustomization is not a mapping".into())),
            }
        } else {
            let mut doc = Mapping::new();
            doc.insert(
                "apiVersion".into(),
                "kustomize.config.k8s.io/v1beta1".into(),
            );
            doc.insert("kind".into(), "Kustomization".into());
            doc
        };

        let resources = doc
            .get(RESOURCES)
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path,
            doc,
            resources,
            changed: false,
        })
    }

    /// The kustomization closest to `file`: the first `kustomization.yaml`
    /// found walking up from the file's directory, or one at the tree root.
    #[must_use]
    pub fn nearest(tree: &Path, file: &Path) -> PathBuf {
        let mut dir = file.parent();
        while let Some(current) = dir {
            let candidate = current.join(KUSTOMIZATION_FILE);
            if tree.join(&candidate).is_file() {
                return candidate;
            }
            dir = current.parent();
        }
        PathBuf::from(KUSTOMIZATION_FILE)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Whether `add` or `remove` changed the list since loading.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.changed
    }

    /// Resource entry for `file` (relative to the tree), i.e. its path
    /// relative to this kustomization's directory.
    ///
    /// # Errors
    /// Returns `PathOutsideRoot` if the file is not below the directory.
    pub fn entry_for(&self, file: &Path) -> Result<String> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let relative = file
            .strip_prefix(dir)
            .ok()
            .filter(|r| r.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| Error::PathOutsideRoot {
                path: file.to_path_buf(),
                root: dir.to_path_buf(),
            })?;

        Ok(relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// Append `entry` unless it is already listed. Returns whether it was added.
    pub fn add(&mut self, entry: &str) -> bool {
        if self.resources.iter().any(|r| r == entry) {
            return false;
        }
        self.resources.push(entry.to_string());
        self.changed = true;
        true
    }

    /// Remove the first exact match of `entry`. Returns whether one was found.
    pub fn remove(&mut self, entry: &str) -> bool {
        let Some(pos) = self.resources.iter().position(|r| r == entry) else {
            return false;
        };
        self.resources.remove(pos);
        self.changed = true;
        true
    }

    /// Rewrite the whole file.
    ///
    /// # Errors
    /// Returns error if the file can't be serialized or written.
    pub fn save(&self, tree: &Path) -> Result<()> {
        let mut doc = self.doc.clone();
        doc.insert(
            RESOURCES.into(),
            Value::Sequence(self.resources.iter().cloned().map(Value::from).collect()),
        );

        let full = tree.join(&self.path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, serde_yaml::to_string(&doc)?)?;

        debug!(path = %self.path.display(), resources = self.resources.len(), "saved kustomization");
        Ok(())
    }
}
