//! Transport credentials for clone, push and ls-remote.

use git2::{CertificateCheckStatus, Cred, CredentialType, RemoteCallbacks};
use secrecy::{ExposeSecret, SecretString};

const MAX_CREDENTIAL_ATTEMPTS: u8 = 3;

/// Credentials used when talking to a remote.
#[derive(Clone, Default)]
pub enum Credentials {
    /// Anonymous access (local paths, `file://` remotes).
    #[default]
    None,

    /// HTTPS basic authentication, typically a token used as password.
    UserPass {
        username: String,
        password: SecretString,
    },

    /// SSH private key held in memory.
    SshKey {
        username: String,
        private_key: SecretString,
        passphrase: Option<SecretString>,
    },
}

impl Credentials {
    /// Credentials for a hosted service that accepts a token as basic-auth password.
    #[must_use]
    pub fn token(username: impl Into<String>, token: SecretString) -> Self {
        Self::UserPass {
            username: username.into(),
            password: token,
        }
    }

    /// Build the remote callbacks for these credentials.
    ///
    /// SSH host keys are accepted without verification.
    pub(crate) fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0_u8;

        callbacks.credentials(move |_url, username_from_url, allowed| {
            // libgit2 keeps asking while the remote rejects what we offer.
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("remote rejected the configured credentials"));
            }
            self.credential(username_from_url, allowed)
        });

        if matches!(self, Self::SshKey { .. }) {
            callbacks.certificate_check(|_cert, _host| Ok(CertificateCheckStatus::CertificateOk));
        }

        callbacks
    }

    fn credential(
        &self,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        match self {
            Self::None => Cred::default(),
            Self::UserPass { username, password } => {
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    Cred::userpass_plaintext(username, password.expose_secret())
                } else {
                    Err(git2::Error::from_str(
                        "remote does not accept username/password credentials",
                    ))
                }
            }
            Self::SshKey {
                username,
                private_key,
                passphrase,
            } => {
                if allowed.contains(CredentialType::USERNAME) {
                    return Cred::username(username_from_url.unwrap_or(username));
                }
                Cred::ssh_key_from_memory(
                    username_from_url.unwrap_or(username),
                    None,
                    private_key.expose_secret(),
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("Credentials::None"),
            Self::UserPass { username, .. } => f
                .debug_struct("Credentials::UserPass")
                .field("username", username)
                .field("password", &"[redacted]")
                .finish(),
            Self::SshKey { username, .. } => f
                .debug_struct("Credentials::SshKey")
                .field("username", username)
                .field("private_key", &"[redacted]")
                .finish_non_exhaustive(),
        }
    }
}
