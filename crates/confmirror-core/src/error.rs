//! Error types for Confmirror.
//!
//! Every failure of the repository access layer is reported as a
//! [`MirrorError`] value. All variants are recoverable by the caller; the
//! only conditions that abort are contract violations (an empty local path
//! or remote URL reaching a network operation), which panic instead.
//!
//! # Example
//!
//! ```
//! use confmirror_core::{MirrorError, Result};
//!
//! fn find(tag: &str) -> Result<()> {
//!     Err(MirrorError::tag_not_found(tag))
//! }
//!
//! let err = find("v9.9").unwrap_err();
//! assert!(err.is_not_found());
//! assert_eq!(err.to_string(), "tag not found: v9.9");
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the versioned repository access layer.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The remote rejected the supplied credentials (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The credentials are valid but lack access (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The remote repository does not exist (HTTP 404 or missing local path).
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Connectivity, DNS, timeout or any unexpected transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The fallback transport exceeded its redirect budget.
    #[error("too many redirects (limit {limit}) while requesting {url}")]
    TooManyRedirects {
        /// Maximum number of redirects that are followed.
        limit: usize,
        /// The last URL that answered with a redirect.
        url: String,
    },

    /// The mirror directory could not be created, deleted or is locked.
    #[error("filesystem error at {path}: {reason}")]
    Filesystem {
        /// Path that could not be handled
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A tag was explicitly requested but peels to a tree or blob.
    #[error("tag '{0}' does not point to a commit")]
    NotACommit(String),

    /// The requested tag does not exist in the mirror.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// A tree nests deeper than the traversal guard allows.
    #[error("tree at '{path}' exceeds the maximum depth of {limit}")]
    TreeDepthExceeded {
        /// Repository-relative path where the limit was hit
        path: String,
        /// The depth limit
        limit: usize,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection profile is incomplete or malformed.
    #[error("invalid connection profile: {0}")]
    InvalidProfile(String),

    /// The version-control engine failed while reading the mirror.
    #[error("engine error: {0}")]
    Engine(String),
}

impl MirrorError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a filesystem error for the given path.
    pub fn filesystem(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a tag-not-found error.
    pub fn tag_not_found(tag: impl Into<String>) -> Self {
        Self::TagNotFound(tag.into())
    }

    /// Creates an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates a network error for an operation that ran out of time.
    pub fn timed_out(operation: &str, seconds: u64) -> Self {
        Self::Network(format!("{} timed out after {}s", operation, seconds))
    }

    /// Returns true for credential problems (401/403).
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Forbidden(_))
    }

    /// Returns true when the repository or tag does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RepositoryNotFound(_) | Self::TagNotFound(_))
    }

    /// Returns true if a later attempt by the caller might succeed.
    ///
    /// This component never retries these on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Filesystem { .. })
    }
}

/// Type alias for Results with [`MirrorError`].
pub type Result<T> = std::result::Result<T, MirrorError>;
