//! Loaded configuration plus the stores it points at.

use std::path::Path;

use anyhow::Context;
use gitward_core::{
    AnyConnector, ApiConfig, Config, ConnectorOptions, Error, FileMirrorStore, RepositoryConfig,
    Result, SecretStore,
};
use secrecy::ExposeSecret;

/// Everything a command or request handler needs.
#[derive(Debug)]
pub struct Workspace {
    pub config: Config,
    pub secrets: SecretStore,
    pub store: FileMirrorStore,
}

impl Workspace {
    /// Load the configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        Ok(Self::from_config(config))
    }

    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            secrets: SecretStore::new(&config.sync.secrets_dir),
            store: FileMirrorStore::new(&config.sync.state_dir),
            config,
        }
    }

    fn connector(
        &self,
        namespace: &str,
        url: &str,
        secret: Option<&str>,
        api_url: Option<&str>,
    ) -> Result<AnyConnector> {
        let secret = secret
            .map(|name| self.secrets.load(namespace, name))
            .transpose()?;

        AnyConnector::from_url(ConnectorOptions {
            url,
            secret: secret.as_ref(),
            api_url,
        })
    }

    /// Build the connector for a mirrored repository.
    pub fn repository_connector(&self, repo: &RepositoryConfig) -> Result<AnyConnector> {
        self.connector(
            &repo.namespace,
            &repo.url,
            repo.secret.as_deref(),
            repo.api_url.as_deref(),
        )
    }

    /// Build the connector for a GitOps API's repository.
    pub fn api_connector(&self, api: &ApiConfig) -> Result<AnyConnector> {
        self.connector(
            &api.namespace,
            &api.repository,
            api.secret.as_deref(),
            api.api_url.as_deref(),
        )
    }

    /// Check a presented token against the API's token secret.
    ///
    /// APIs without a token secret accept every request.
    pub fn authorize(&self, api: &ApiConfig, presented: Option<&str>) -> Result<()> {
        let Some(secret_name) = api.token_secret.as_deref() else {
            return Ok(());
        };

        let secret = self.secrets.load(&api.namespace, secret_name)?;
        let expected = secret.require("TOKEN")?;
        match presented {
            Some(token) if token == expected.expose_secret() => Ok(()),
            _ => Err(Error::Forbidden),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(temp: &TempDir, apis: &str) -> Workspace {
        let config: Config = toml::from_str(&format!(
            "[sync]\nsecrets_dir = {:?}\nstate_dir = {:?}\n{apis}",
            temp.path().join("secrets"),
            temp.path().join("state"),
        ))
        .unwrap();
        Workspace::from_config(config)
    }

    const API: &str = r#"
[[apis]]
name = "configs"
repository = "file:///srv/git/infra.git"
token_secret = "api-token"
"#;

    #[test]
    fn test_authorize_compares_token() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("secrets/default/api-token");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("TOKEN"), "s3cret\n").unwrap();

        let ws = workspace(&temp, API);
        let api = ws.config.api("default", "configs").unwrap();

        assert!(ws.authorize(api, Some("s3cret")).is_ok());
        assert!(matches!(ws.authorize(api, Some("nope")), Err(Error::Forbidden)));
        assert!(matches!(ws.authorize(api, None), Err(Error::Forbidden)));
    }

    #[test]
    fn test_missing_token_secret_is_config_error() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp, API);
        let api = ws.config.api("default", "configs").unwrap();

        let err = ws.authorize(api, Some("x")).unwrap_err();
        assert_eq!(err.kind(), gitward_core::ErrorKind::Config);
    }

    #[test]
    fn test_file_repository_needs_no_secret() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp, API);
        let api = ws.config.api("default", "configs").unwrap();

        assert!(ws.api_connector(api).is_ok());
    }
}
