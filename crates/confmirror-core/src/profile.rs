//! Connection profiles.
//!
//! A [`ConnectionProfile`] describes one logical repository (module, device,
//! block or firmware repository): where the remote lives, where its local
//! mirror is kept and which credentials to present. Profiles are immutable;
//! `localPath` is resolved to an absolute path when the profile is built.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Connection settings for a single logical repository.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProfileDocument")]
pub struct ConnectionProfile {
    /// Absolute path of the local mirror.
    local_path: PathBuf,

    /// The remote repository URL.
    remote_url: String,

    /// Username for explicit authentication (empty means anonymous).
    username: String,

    /// Password or token for explicit authentication.
    #[serde(skip_serializing)]
    secret: String,

    /// Upper bound for a full clone.
    #[serde(with = "seconds")]
    clone_timeout: Duration,

    /// Upper bound for a fetch-in-place.
    #[serde(with = "seconds")]
    fetch_timeout: Duration,

    /// Per-request bound for the fallback HTTP transport.
    #[serde(with = "seconds")]
    http_timeout: Duration,

    /// Whether a failed clone may be retried through the fallback transport.
    fallback_transport: bool,

    /// Reads trigger a fetch when the last sync is older than this.
    #[serde(with = "optional_seconds", skip_serializing_if = "Option::is_none")]
    refresh_after: Option<Duration>,
}

fn default_clone_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

impl ConnectionProfile {
    /// Creates a new builder for ConnectionProfile.
    pub fn builder() -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::default()
    }

    /// Returns the absolute path of the local mirror.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Returns the remote repository URL.
    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Returns the username (empty when anonymous).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password or token.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns true when explicit credentials are configured.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Returns the clone timeout.
    pub fn clone_timeout(&self) -> Duration {
        self.clone_timeout
    }

    /// Returns the fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Returns the per-request timeout of the fallback transport, also the
    /// native transport's connect and socket timeout.
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Returns whether the fallback transport may be used.
    pub fn fallback_transport(&self) -> bool {
        self.fallback_transport
    }

    /// Returns the staleness bound after which reads re-sync the mirror.
    pub fn refresh_after(&self) -> Option<Duration> {
        self.refresh_after
    }

    /// Returns a copy of this profile bound to a different remote.
    ///
    /// Used when a per-device-type firmware repository is resolved at
    /// runtime; the original profile is left untouched.
    pub fn with_remote_url(&self, remote_url: impl Into<String>) -> Result<Self> {
        let remote_url = remote_url.into();
        if remote_url.trim().is_empty() {
            return Err(MirrorError::InvalidProfile(
                "remoteUrl cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            remote_url,
            ..self.clone()
        })
    }

    /// Panics when the profile cannot be used for a network operation.
    ///
    /// An empty path or URL here is a caller bug, not an environmental
    /// condition.
    pub fn assert_network_ready(&self) {
        assert!(
            !self.local_path.as_os_str().is_empty(),
            "connection profile has an empty localPath"
        );
        assert!(
            !self.remote_url.trim().is_empty(),
            "connection profile has an empty remoteUrl"
        );
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("local_path", &self.local_path)
            .field("remote_url", &self.remote_url)
            .field("username", &self.username)
            .field("secret", &if self.secret.is_empty() { "" } else { "***" })
            .field("clone_timeout", &self.clone_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("fallback_transport", &self.fallback_transport)
            .field("refresh_after", &self.refresh_after)
            .finish()
    }
}

/// Builder for ConnectionProfile.
#[derive(Debug, Default)]
pub struct ConnectionProfileBuilder {
    local_path: Option<PathBuf>,
    remote_url: Option<String>,
    username: Option<String>,
    secret: Option<String>,
    clone_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    http_timeout: Option<Duration>,
    fallback_transport: Option<bool>,
    refresh_after: Option<Duration>,
}

impl ConnectionProfileBuilder {
    /// Sets the local mirror path.
    pub fn local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Sets the remote repository URL.
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Sets explicit username/secret credentials.
    pub fn credentials(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.secret = Some(secret.into());
        self
    }

    /// Sets the clone timeout.
    pub fn clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = Some(timeout);
        self
    }

    /// Sets the fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Sets the per-request timeout of the fallback transport, also the
    /// native transport's connect and socket timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Enables or disables the fallback transport.
    pub fn fallback_transport(mut self, enabled: bool) -> Self {
        self.fallback_transport = Some(enabled);
        self
    }

    /// Sets the staleness bound for reads.
    pub fn refresh_after(mut self, after: Duration) -> Self {
        self.refresh_after = Some(after);
        self
    }

    /// Builds the profile.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidProfile`] if a required field is missing
    /// or empty, or if the local path cannot be made absolute.
    pub fn build(self) -> Result<ConnectionProfile> {
        let local_path = self
            .local_path
            .ok_or_else(|| MirrorError::InvalidProfile("localPath is required".to_string()))?;
        let remote_url = self
            .remote_url
            .ok_or_else(|| MirrorError::InvalidProfile("remoteUrl is required".to_string()))?;

        ProfileDocument {
            local_path,
            remote_url,
            username: self.username.unwrap_or_default(),
            secret: self.secret.unwrap_or_default(),
            clone_timeout: self.clone_timeout.unwrap_or_else(default_clone_timeout),
            fetch_timeout: self.fetch_timeout.unwrap_or_else(default_fetch_timeout),
            http_timeout: self.http_timeout.unwrap_or_else(default_http_timeout),
            fallback_transport: self.fallback_transport.unwrap_or(true),
            refresh_after: self.refresh_after,
        }
        .try_into()
    }
}

/// The wire shape of a profile before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDocument {
    local_path: PathBuf,
    remote_url: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    secret: String,
    #[serde(default = "default_clone_timeout", with = "seconds")]
    clone_timeout: Duration,
    #[serde(default = "default_fetch_timeout", with = "seconds")]
    fetch_timeout: Duration,
    #[serde(default = "default_http_timeout", with = "seconds")]
    http_timeout: Duration,
    #[serde(default = "default_true")]
    fallback_transport: bool,
    #[serde(default, with = "optional_seconds")]
    refresh_after: Option<Duration>,
}

impl TryFrom<ProfileDocument> for ConnectionProfile {
    type Error = MirrorError;

    fn try_from(doc: ProfileDocument) -> Result<Self> {
        if doc.local_path.as_os_str().is_empty() {
            return Err(MirrorError::InvalidProfile(
                "localPath cannot be empty".to_string(),
            ));
        }
        if doc.remote_url.trim().is_empty() {
            return Err(MirrorError::InvalidProfile(
                "remoteUrl cannot be empty".to_string(),
            ));
        }

        let local_path = std::path::absolute(&doc.local_path).map_err(|e| {
            MirrorError::InvalidProfile(format!(
                "cannot resolve {}: {}",
                doc.local_path.display(),
                e
            ))
        })?;

        Ok(Self {
            local_path,
            remote_url: doc.remote_url.trim().to_string(),
            username: doc.username,
            secret: doc.secret,
            clone_timeout: doc.clone_timeout,
            fetch_timeout: doc.fetch_timeout,
            http_timeout: doc.http_timeout,
            fallback_transport: doc.fallback_transport,
            refresh_after: doc.refresh_after,
        })
    }
}

mod seconds {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod optional_seconds {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
