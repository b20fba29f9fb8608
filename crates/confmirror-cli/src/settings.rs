//! Settings loading.
//!
//! ```toml
//! workers = 4
//!
//! [repositories.blocks]
//! remoteUrl = "https://git.example.com/cfg/blocks.git"
//! localPath = "/var/lib/confmirror/blocks"
//! username = "svc-config"
//! cloneTimeout = 300
//! ```
//!
//! Environment variables prefixed `CONFMIRROR` override the file, with `__`
//! separating keys: `CONFMIRROR__REPOSITORIES__BLOCKS__SECRET=...`. Environment keys are
//! lowercased, so only single-word profile fields (`username`, `secret`) can
//! be set that way.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use confmirror_core::ConnectionProfile;
use confmirror_git::blocking::DEFAULT_WORKERS;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CONFMIRROR";

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Process-wide settings.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Concurrent blocking engine calls.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Connection profiles by repository name.
    #[serde(default)]
    pub repositories: BTreeMap<String, ConnectionProfile>,
}

impl Settings {
    /// Loads settings from `path` (if it exists) layered with the environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    fn load_with(path: &Path, environment: Environment) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("settings path {} is not UTF-8", path.display()))?;

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("failed to read settings from {}", path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    /// Returns the profile named `name`.
    pub fn profile(&self, name: &str) -> Result<&ConnectionProfile> {
        self.repositories.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.repositories.keys().map(String::as_str).collect();
            anyhow!(
                "unknown repository '{}' (configured: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })
    }
}
