//! Credential provider.
//!
//! Supplies credentials to the engine's native transport (through
//! `git2` credential callbacks) and to the fallback smart-HTTP transport.

use std::fmt;

use confmirror_core::ConnectionProfile;
use git2::{Cred, CredentialType, ErrorClass, ErrorCode};
use tracing::debug;

/// How many times the remote may ask for credentials within one attempt.
const MAX_AUTH_ROUNDS: u32 = 3;

/// Credentials presented to a remote.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No credentials.
    Anonymous,
    /// HTTP basic credentials.
    Basic {
        /// Username
        username: String,
        /// Password or token
        secret: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("secret", &"***")
                .finish(),
        }
    }
}

/// Which credentials an attempt presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Whatever the environment provides: negotiate/NTLM or a configured
    /// git credential helper.
    Default,
    /// The username/secret from the connection profile.
    Explicit,
}

/// Supplies credentials for one connection profile.
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    explicit: Credentials,
}

impl CredentialProvider {
    /// Creates a provider from the profile's username/secret.
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        let explicit = if profile.has_credentials() {
            Credentials::Basic {
                username: profile.username().to_string(),
                secret: profile.secret().to_string(),
            }
        } else {
            Credentials::Anonymous
        };

        Self { explicit }
    }

    /// Returns the explicit credentials.
    pub fn explicit(&self) -> &Credentials {
        &self.explicit
    }

    /// Builds a `git2` credential callback for the given mode.
    ///
    /// The callback gives up after a bounded number of rounds so a remote
    /// that keeps rejecting credentials yields an authentication error
    /// instead of an endless challenge loop.
    pub fn callback(
        &self,
        mode: CredentialMode,
    ) -> impl FnMut(&str, Option<&str>, CredentialType) -> Result<Cred, git2::Error> + 'static {
        let explicit = self.explicit.clone();
        let mut rounds = 0;

        move |url, username_from_url, allowed| {
            rounds += 1;
            if rounds > MAX_AUTH_ROUNDS {
                return Err(rejected(url));
            }

            debug!(
                "Credential request #{} for {} ({:?}, allowed {:?})",
                rounds, url, mode, allowed
            );

            match mode {
                CredentialMode::Default => default_credentials(url, username_from_url, allowed),
                CredentialMode::Explicit => match &explicit {
                    Credentials::Basic { username, secret }
                        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
                    {
                        Cred::userpass_plaintext(username, secret)
                    },
                    Credentials::Basic { username, .. }
                        if allowed.contains(CredentialType::USERNAME) =>
                    {
                        Cred::username(username)
                    },
                    _ if allowed.contains(CredentialType::DEFAULT) => Cred::default(),
                    _ => Err(rejected(url)),
                },
            }
        }
    }
}

fn default_credentials(
    url: &str,
    username_from_url: Option<&str>,
    allowed: CredentialType,
) -> Result<Cred, git2::Error> {
    if allowed.contains(CredentialType::DEFAULT) {
        return Cred::default();
    }

    if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
        && let Ok(config) = git2::Config::open_default()
        && let Ok(cred) = Cred::credential_helper(&config, url, username_from_url)
    {
        return Ok(cred);
    }

    Err(rejected(url))
}

fn rejected(url: &str) -> git2::Error {
    git2::Error::new(
        ErrorCode::Auth,
        ErrorClass::Http,
        format!("401 credentials rejected for {}", url),
    )
}
