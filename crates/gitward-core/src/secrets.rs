//! Secrets laid out like a mounted Kubernetes secret: one directory per
//! secret, one file per key.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::{Error, Result};

/// A loaded secret.
#[derive(Clone)]
pub struct Secret {
    /// `namespace/name`, for error messages.
    name: String,
    data: BTreeMap<String, SecretString>,
}

impl Secret {
    /// Build a secret from key/value pairs.
    #[must_use]
    pub fn from_pairs<'a>(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            name: name.into(),
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), SecretString::from(v.to_string())))
                .collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.data.get(key)
    }

    /// Get a key that must be present.
    ///
    /// # Errors
    /// Returns `MissingSecretField` if the key is absent.
    pub fn require(&self, key: &'static str) -> Result<&SecretString> {
        self.get(key).ok_or_else(|| Error::MissingSecretField {
            secret: self.name.clone(),
            field: key,
        })
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads secrets from `<root>/<namespace>/<name>/<KEY>`.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
}

impl SecretStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load every key of a secret.
    ///
    /// Trailing newlines are stripped from values.
    ///
    /// # Errors
    /// Returns `SecretNotFound` if the directory is missing, or an IO error
    /// if a key can't be read.
    pub fn load(&self, namespace: &str, name: &str) -> Result<Secret> {
        let dir = self.root.join(namespace).join(name);
        if !dir.is_dir() {
            return Err(Error::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let mut data = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            // Kubernetes mounts keys through `..data` symlinks; skip the dot entries.
            let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if key.starts_with('.') || !path.is_file() {
                continue;
            }
            let value = fs::read_to_string(&path)?;
            let value = value.trim_end_matches(['\n', '\r']).to_string();
            data.insert(key.to_string(), SecretString::from(value));
        }

        Ok(Secret {
            name: format!("{namespace}/{name}"),
            data,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_load_secret_keys() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("default/git");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("GITHUB_TOKEN"), "ghp_abc\n").unwrap();

        let secret = SecretStore::new(temp.path()).load("default", "git").unwrap();

        assert_eq!(
            secret.require("GITHUB_TOKEN").unwrap().expose_secret(),
            "ghp_abc"
        );
        assert_eq!(secret.name(), "default/git");
    }

    #[test]
    fn test_missing_secret_and_field() {
        let temp = TempDir::new().unwrap();
        let store = SecretStore::new(temp.path());

        assert!(matches!(
            store.load("default", "absent"),
            Err(Error::SecretNotFound { .. })
        ));

        let secret = Secret::from_pairs("default/git", [("TOKEN", "t")]);
        let err = secret.require("GITHUB_TOKEN").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingSecretField { field: "GITHUB_TOKEN", .. }
        ));
    }

    #[test]
    fn test_debug_hides_values() {
        let secret = Secret::from_pairs("default/git", [("TOKEN", "hunter2")]);
        let rendered = format!("{secret:?}");
        assert!(rendered.contains("TOKEN"));
        assert!(!rendered.contains("hunter2"));
    }
}
