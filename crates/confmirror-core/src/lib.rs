//! Confmirror Core - Domain types
//!
//! This crate provides the values shared by the repository access layer and
//! its consumers: connection profiles, tags, retrieved files and the error
//! taxonomy.

pub mod error;
pub mod profile;
pub mod types;

pub use error::{MirrorError, Result};
pub use profile::{ConnectionProfile, ConnectionProfileBuilder};
pub use types::{RetrievedFile, Tag};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
