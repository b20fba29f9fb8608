//! # Confmirror Git
//!
//! Versioned repository access layer: keeps local mirrors of remote git
//! repositories and reads them as of a version tag.
//!
//! ## Features
//!
//! - Local mirrors with clone, fetch-in-place and re-clone of broken mirrors
//! - Smart-HTTP fallback transport for environments where the native
//!   transport cannot complete a clone
//! - Tag timeline ordered by commit author time
//! - File content, path presence and path changes at any tag
//! - Async API over a bounded worker pool with per-mirror locking
//!
//! ## Example
//!
//! ```ignore
//! use confmirror_core::ConnectionProfile;
//! use confmirror_git::MirrorRegistry;
//!
//! let profile = ConnectionProfile::builder()
//!     .remote_url("https://git.example.com/cfg/blocks.git")
//!     .local_path("/var/lib/confmirror/blocks")
//!     .credentials("svc-config", token)
//!     .build()?;
//!
//! let registry = MirrorRegistry::new(4);
//! let blocks = registry.register(profile);
//!
//! blocks.sync().await?;
//! let tags = blocks.list_tag_names().await?;
//! let files = blocks.get_files_at_tag(&tags[0], "ethernet").await?;
//! ```

pub mod blocking;
pub mod content;
pub mod credentials;
pub mod error;
pub mod index;
pub mod mirror;
pub mod registry;
pub mod repository;
pub mod source;
pub mod transport;

// Re-exports
pub use blocking::BlockingPool;
pub use content::{ContentRetriever, TreeWalker};
pub use credentials::{CredentialMode, CredentialProvider, Credentials};
pub use index::TagIndex;
pub use mirror::{MirrorManager, MirrorStatus, SyncKind, SyncReport};
pub use registry::MirrorRegistry;
pub use repository::VersionedRepository;
pub use source::VersionedSource;
pub use transport::{Attempt, SmartHttpClient, TransportError};

// Re-export confmirror_core for consumers
pub use confmirror_core;
