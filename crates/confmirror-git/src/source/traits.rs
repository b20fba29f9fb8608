//! Versioned source trait definition.

use async_trait::async_trait;
use confmirror_core::{Result, RetrievedFile};

/// A repository whose content can be read as of a version tag.
///
/// This is the seam between the access layer and the business logic above
/// it (configuration merging, HTTP controllers), which can be tested
/// against an in-memory implementation.
///
/// # Implementors
///
/// - `VersionedRepository` - a local mirror of a remote git repository
///
/// # Example
///
/// ```ignore
/// use confmirror_git::{VersionedSource, VersionedRepository};
///
/// async fn latest_ethernet(source: &dyn VersionedSource) -> Result<Vec<u8>> {
///     let tags = source.list_tag_names().await?;
///     let files = source.get_files_at_tag(&tags[0], "ethernet").await?;
///     Ok(files[0].data().to_vec())
/// }
/// ```
#[async_trait]
pub trait VersionedSource: Send + Sync {
    /// Makes sure the local mirror exists and reflects the remote.
    ///
    /// # Errors
    ///
    /// - `MirrorError::Unauthorized` / `Forbidden` for rejected credentials
    /// - `MirrorError::RepositoryNotFound` if the remote does not exist
    /// - `MirrorError::Network` for connectivity problems and timeouts
    /// - `MirrorError::Filesystem` if the mirror directory cannot be managed
    async fn ensure_current(&self) -> Result<()>;

    /// Returns commit tag names, newest first.
    async fn list_tag_names(&self) -> Result<Vec<String>>;

    /// Returns the names of tags strictly older than `tag`, newest first.
    async fn tags_older_than(&self, tag: &str) -> Result<Vec<String>>;

    /// Returns the files at `tag` whose path contains `pattern`
    /// (case-insensitive).
    async fn get_files_at_tag(&self, tag: &str, pattern: &str) -> Result<Vec<RetrievedFile>>;

    /// Returns true if a file or folder exists at `path` at `tag`.
    async fn is_path_present_at_tag(&self, tag: &str, path: &str) -> Result<bool>;

    /// Returns true if `path` differs between the two tags.
    async fn did_path_change_between_tags(
        &self,
        from_tag: &str,
        to_tag: &str,
        path: &str,
    ) -> Result<bool>;

    /// Returns the name of this source.
    ///
    /// This is used for logging and identification purposes.
    fn name(&self) -> &str;

    /// Performs a health check on the source.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
