//! Configuration management for gitward.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gitward.toml";

/// gitward configuration loaded from `gitward.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Reconciliation settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Repositories whose branches, pull requests and deployments are mirrored.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    /// GitOps API resources served over HTTP.
    #[serde(default)]
    pub apis: Vec<ApiConfig>,
}

impl Config {
    /// Load config from a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find a GitOps API resource.
    ///
    /// # Errors
    /// Returns `ApiNotFound` if none matches.
    pub fn api(&self, namespace: &str, name: &str) -> Result<&ApiConfig> {
        self.apis
            .iter()
            .find(|a| a.namespace == namespace && a.name == name)
            .ok_or_else(|| Error::ApiNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Find a repository by name.
    ///
    /// # Errors
    /// Returns `RepositoryNotConfigured` if none matches.
    pub fn repository(&self, name: &str) -> Result<&RepositoryConfig> {
        self.repositories
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::RepositoryNotConfigured(name.to_string()))
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8888))
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between reconciliation passes.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Root of the mirror store.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root of the secret directories.
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            state_dir: default_state_dir(),
            secrets_dir: default_secrets_dir(),
        }
    }
}

const fn default_period_secs() -> u64 {
    60
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gitward/state")
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from(".gitward/secrets")
}

const fn default_true() -> bool {
    true
}

/// A mirrored repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    pub url: String,

    /// Secret holding the connector credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Custom API URL (GitHub Enterprise, a self-hosted Azure DevOps Server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Whether deployments are mirrored.
    #[serde(default = "default_true")]
    pub deployments: bool,
}

fn default_namespace() -> String {
    "default".into()
}

/// Pull request templates of a GitOps API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

/// A GitOps API resource.
///
/// `branch`, `kustomization`, `path` and every pull request field are
/// templates expanded against the first submitted object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Repository URL.
    pub repository: String,

    /// Secret holding the connector credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Secret holding the `TOKEN` callers must present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,

    #[serde(default = "default_base")]
    pub base: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Open a pull request from the working branch when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestConfig>,

    /// Added to the pull request reviewers.
    #[serde(default)]
    pub reviewers: Vec<String>,

    /// Added to the pull request assignees.
    #[serde(default)]
    pub assignees: Vec<String>,

    #[serde(default = "default_git_user")]
    pub git_user: String,

    #[serde(default = "default_git_email")]
    pub git_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Directory searched for existing objects; `path` is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_base() -> String {
    "master".into()
}

fn default_git_user() -> String {
    "Git Operator".into()
}

fn default_git_email() -> String {
    "git-operator@noreply.flanksource.com".into()
}
