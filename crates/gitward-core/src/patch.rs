//! GitOps patch orchestrator.
//!
//! One request becomes one checkout, at most one commit and at most one pull
//! request:
//!
//! ```text
//! clone(base, branch) -> locate -> merge | create | delete (per object)
//!   -> update kustomizations -> commit -> push -> [open pull request]
//! ```
//!
//! Any failure before the push discards the checkout, so a partial commit is
//! never published.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use gitward_git::Author;
use serde_yaml::Value;
use tracing::{debug, info, instrument};

use crate::config::ApiConfig;
use crate::connector::{Connector, PullRequestTemplate, WorkingTree};
use crate::error::{Error, Result};
use crate::kustomize::Kustomization;
use crate::locator::{Locator, tree_path};
use crate::merge::{self, Removal};
use crate::object::{ObjectKey, RepoObject};
use crate::template::{expand, expand_opt};

/// What to do with the submitted objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Merge into the stored object, or store it in a new file.
    Apply,
    Delete,
}

/// Objects submitted in one call.
#[derive(Debug, Clone)]
pub struct GitOpsRequest {
    pub operation: Operation,
    pub objects: Vec<RepoObject>,
}

/// Result of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub branch: String,
    /// `None` when the request changed nothing.
    pub commit: Option<String>,
    pub pull_request: Option<u64>,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit {
            None => write!(f, "No changes to commit"),
            Some(sha) => {
                write!(f, "Committed {sha}")?;
                if let Some(id) = self.pull_request {
                    write!(f, ", opened pull request #{id}")?;
                }
                Ok(())
            }
        }
    }
}

/// Lowercase `text`, keeping ASCII letters and digits and collapsing
/// everything else into single dashes.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Push every non-empty value into `list` unless already present.
fn extend_unique(list: &mut Vec<String>, values: impl IntoIterator<Item = String>) {
    for value in values {
        if !value.is_empty() && !list.contains(&value) {
            list.push(value);
        }
    }
}

// === Planning ===

/// Branch and pull request settings resolved against the first object.
#[derive(Debug)]
struct Plan {
    branch: String,
    pull_request: Option<PullRequestTemplate>,
}

impl Plan {
    fn resolve(api: &ApiConfig, first: &Value) -> Result<Self> {
        let pull_request = match &api.pull_request {
            None => None,
            Some(pr) => {
                let mut reviewers = Vec::new();
                for reviewer in pr.reviewers.iter().chain(&api.reviewers) {
                    extend_unique(&mut reviewers, [expand(reviewer, first)?]);
                }
                let mut assignees = Vec::new();
                for assignee in pr.assignees.iter().chain(&api.assignees) {
                    extend_unique(&mut assignees, [expand(assignee, first)?]);
                }
                Some(PullRequestTemplate {
                    title: expand(&pr.title, first)?,
                    body: expand(&pr.body, first)?,
                    reviewers,
                    assignees,
                })
            }
        };

        let branch = match expand_opt(api.branch.as_deref(), first)? {
            Some(branch) if !branch.is_empty() => branch,
            _ => match &pull_request {
                Some(pr) => {
                    let slug = slugify(&pr.title);
                    let slug = if slug.is_empty() { "gitward".to_string() } else { slug };
                    format!("{slug}-{}", random_suffix())
                }
                None => api.base.clone(),
            },
        };

        Ok(Self {
            branch,
            pull_request,
        })
    }
}

// === Tree edits ===

/// Per-request state over one working tree.
struct TreeEdit<'a> {
    root: &'a Path,
    api: &'a ApiConfig,
    locator: Option<Locator>,
    kustomizations: BTreeMap<PathBuf, Kustomization>,
    titles: Vec<String>,
    lines: Vec<String>,
}

impl<'a> TreeEdit<'a> {
    fn new(root: &'a Path, api: &'a ApiConfig) -> Result<Self> {
        let locator = api
            .search_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|search| Locator::new(root, search))
            .transpose()?;

        Ok(Self {
            root,
            api,
            locator,
            kustomizations: BTreeMap::new(),
            titles: Vec::new(),
            lines: Vec::new(),
        })
    }

    fn static_path(&self, body: &Value) -> Result<PathBuf> {
        let template = self
            .api
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(Error::MissingSetting("path"))?;
        tree_path(expand(template, body)?)
    }

    fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(self.root.join(path))?)
    }

    fn parse_error(path: &Path, e: &serde_yaml::Error) -> Error {
        Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    /// File currently holding `object`, if any.
    fn find(&mut self, object: &RepoObject) -> Result<Option<PathBuf>> {
        if let Some(locator) = self.locator.as_mut() {
            return locator.locate(&object.key);
        }

        let path = self.static_path(&object.body)?;
        if !self.root.join(&path).is_file() {
            return Ok(None);
        }
        let text = self.read(&path)?;
        let docs = merge::documents(&text).map_err(|e| Self::parse_error(&path, &e))?;
        Ok(docs
            .iter()
            .any(|d| d.key().as_ref() == Some(&object.key))
            .then_some(path))
    }

    fn kustomization_for(&mut self, file: &Path, body: &Value) -> Result<&mut Kustomization> {
        let path = match expand_opt(self.api.kustomization.as_deref(), body)? {
            Some(template) => tree_path(template)?,
            None => Kustomization::nearest(self.root, file),
        };

        match self.kustomizations.entry(path) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let loaded = Kustomization::load(self.root, entry.key().clone())?;
                Ok(entry.insert(loaded))
            }
        }
    }

    fn apply(&mut self, object: &RepoObject) -> Result<()> {
        let key = &object.key;

        if let Some(path) = self.find(object)? {
            let text = self.read(&path)?;
            let merged = merge::merge_into(&text, object)
                .map_err(|e| Self::parse_error(&path, &e))?
                .ok_or_else(|| Error::ObjectNotFound(key.clone()))?;
            fs::write(self.root.join(&path), merged)?;

            let kustomization = self.kustomization_for(&path, &object.body)?;
            let entry = kustomization.entry_for(&path)?;
            kustomization.add(&entry);

            debug!(%key, path = %path.display(), "merged object");
            self.titles
                .push(format!("Update {} {}/{}", key.kind, key.namespace, key.name));
            self.lines.push(format!(
                "Updated resource `{key}` in `{}`",
                display_path(&path)
            ));
            return Ok(());
        }

        let path = self.static_path(&object.body)?;
        let full = self.root.join(&path);
        let block = serde_yaml::to_string(&object.body)?;
        let text = if full.is_file() {
            let existing = fs::read_to_string(&full)?;
            let separator = if existing.ends_with('\n') { "---\n" } else { "\n---\n" };
            format!("{existing}{separator}{block}")
        } else {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            block
        };
        fs::write(&full, text)?;

        let kustomization = self.kustomization_for(&path, &object.body)?;
        let entry = kustomization.entry_for(&path)?;
        kustomization.add(&entry);

        if let Some(locator) = self.locator.as_mut() {
            locator.record(key.clone(), path.clone());
        }

        debug!(%key, path = %path.display(), "stored new object");
        self.titles
            .push(format!("Update {} {}/{}", key.kind, key.namespace, key.name));
        self.lines.push(format!(
            "Added resource `{key}` in `{}`",
            display_path(&path)
        ));
        Ok(())
    }

    fn delete(&mut self, object: &RepoObject) -> Result<()> {
        let key = &object.key;
        let path = self
            .find(object)?
            .ok_or_else(|| Error::ObjectNotFound(key.clone()))?;
        let text = self.read(&path)?;

        match merge::remove_from(&text, key).map_err(|e| Self::parse_error(&path, &e))? {
            Removal::NotFound => return Err(Error::ObjectNotFound(key.clone())),
            Removal::Removed(rest) => fs::write(self.root.join(&path), rest)?,
            Removal::Emptied => {
                fs::remove_file(self.root.join(&path))?;
                let kustomization = self.kustomization_for(&path, &object.body)?;
                let entry = kustomization.entry_for(&path)?;
                kustomization.remove(&entry);
            }
        }

        if let Some(locator) = self.locator.as_mut() {
            locator.forget(key);
        }

        debug!(%key, path = %path.display(), "removed object");
        self.titles
            .push(format!("Delete {} {}/{}", key.kind, key.namespace, key.name));
        self.lines.push(format!(
            "Removed resource `{key}` from `{}`",
            display_path(&path)
        ));
        Ok(())
    }

    fn save_kustomizations(&self) -> Result<()> {
        for kustomization in self.kustomizations.values().filter(|k| k.is_changed()) {
            kustomization.save(self.root)?;
        }
        Ok(())
    }
}

// === Orchestrator ===

/// Runs GitOps requests for one API resource against one repository.
pub struct Orchestrator<'a, C: ?Sized> {
    connector: &'a C,
    api: &'a ApiConfig,
}

impl<'a, C: Connector + ?Sized> Orchestrator<'a, C> {
    #[must_use]
    pub const fn new(connector: &'a C, api: &'a ApiConfig) -> Self {
        Self { connector, api }
    }

    /// Apply or delete the request's objects in one commit, then open a pull
    /// request when the API asks for one.
    ///
    /// # Errors
    /// Fails without pushing if any object fails. Returns
    /// `PullRequestFailed` if the commit was pushed but the pull request
    /// could not be opened.
    #[instrument(skip_all, fields(api = %self.api.name, objects = request.objects.len(), operation = ?request.operation))]
    pub async fn run(&self, request: &GitOpsRequest) -> Result<PatchOutcome> {
        let first = request
            .objects
            .first()
            .ok_or_else(|| Error::InvalidBody("no objects in request".into()))?;
        let plan = Plan::resolve(self.api, &first.body)?;

        let Some(committed) = self.commit(&plan, request)? else {
            info!(branch = %plan.branch, "nothing to commit");
            return Ok(PatchOutcome {
                branch: plan.branch,
                commit: None,
                pull_request: None,
            });
        };

        let pull_request = match plan.pull_request {
            None => None,
            Some(mut template) => {
                if template.title.is_empty() {
                    template.title.clone_from(&committed.title);
                }
                if template.body.is_empty() {
                    template.body.clone_from(&committed.body);
                }

                let id = self
                    .connector
                    .open_pull_request(&self.api.base, &plan.branch, &template)
                    .await
                    .map_err(|e| Error::PullRequestFailed {
                        branch: plan.branch.clone(),
                        commit: committed.sha.clone(),
                        source: Box::new(e),
                    })?;
                info!(id, branch = %plan.branch, "opened pull request");
                Some(id)
            }
        };

        Ok(PatchOutcome {
            branch: plan.branch,
            commit: Some(committed.sha),
            pull_request,
        })
    }

    /// The git half of a request. The working tree is gone when this returns.
    fn commit(&self, plan: &Plan, request: &GitOpsRequest) -> Result<Option<Committed>> {
        let tree = self
            .connector
            .clone_worktree(&self.api.base, &plan.branch)?;
        let mut edit = TreeEdit::new(tree.path(), self.api)?;

        for object in &request.objects {
            match request.operation {
                Operation::Apply => edit.apply(object)?,
                Operation::Delete => edit.delete(object)?,
            }
        }
        edit.save_kustomizations()?;

        let repo = tree.repository();
        repo.stage_all()?;
        if !repo.has_staged_changes()? {
            return Ok(None);
        }

        let title = match &plan.pull_request {
            Some(pr) if !pr.title.is_empty() => pr.title.clone(),
            _ => edit.titles.join(", "),
        };
        let body = edit.lines.join("\n");
        let author = Author::new(&self.api.git_user, &self.api.git_email);
        let oid = repo.create_commit(&format!("{title}\n\n{body}"), &author)?;

        self.connector.push(&tree, &tree.refspec())?;
        info!(commit = %oid, branch = %plan.branch, "pushed");

        Ok(Some(Committed {
            sha: oid.to_string(),
            title,
            body,
        }))
    }

    /// Read the stored form of `key` from the base branch.
    ///
    /// `object` supplies the fields the `path` template refers to when no
    /// search path is configured.
    ///
    /// # Errors
    /// Returns `ObjectNotFound` if no file holds the object.
    #[instrument(skip_all, fields(api = %self.api.name, %key))]
    pub fn get(&self, key: &ObjectKey) -> Result<Value> {
        let tree: WorkingTree = self
            .connector
            .clone_worktree(&self.api.base, &self.api.base)?;
        let mut edit = TreeEdit::new(tree.path(), self.api)?;

        let lookup = RepoObject {
            key: key.clone(),
            body: key_document(key),
        };
        let path = edit
            .find(&lookup)?
            .ok_or_else(|| Error::ObjectNotFound(key.clone()))?;

        let text = edit.read(&path)?;
        merge::documents(&text)
            .map_err(|e| TreeEdit::parse_error(&path, &e))?
            .into_iter()
            .find(|d| d.key().as_ref() == Some(key))
            .map(|d| d.value)
            .ok_or_else(|| Error::ObjectNotFound(key.clone()))
    }
}

/// Commit made by a request.
#[derive(Debug)]
struct Committed {
    sha: String,
    title: String,
    body: String,
}

/// Minimal document carrying only an object's identity.
fn key_document(key: &ObjectKey) -> Value {
    let mut metadata = serde_yaml::Mapping::new();
    metadata.insert("name".into(), key.name.as_str().into());
    if !key.namespace.is_empty() {
        metadata.insert("namespace".into(), key.namespace.as_str().into());
    }
    let mut doc = serde_yaml::Mapping::new();
    doc.insert("kind".into(), key.kind.as_str().into());
    doc.insert("metadata".into(), Value::Mapping(metadata));
    Value::Mapping(doc)
}
