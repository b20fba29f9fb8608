//! The async facade over one logical repository.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use confmirror_core::{ConnectionProfile, MirrorError, Result, RetrievedFile, Tag};
use git2::{ErrorCode, Repository};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blocking::BlockingPool;
use crate::content::ContentRetriever;
use crate::error::engine;
use crate::index::{TagIndex, changed_between, is_present};
use crate::mirror::{MARKER_DIR, MirrorManager, MirrorStatus, SyncReport};
use crate::source::VersionedSource;

/// A remote repository accessed through its local mirror.
///
/// Mutations (clone, fetch, re-clone) take the mirror's lock exclusively and
/// reads share it, so a sync that completed before a query is visible to
/// it. Engine work runs on the [`BlockingPool`].
pub struct VersionedRepository {
    profile: Arc<ConnectionProfile>,
    pub(crate) lock: Arc<RwLock<()>>,
    status: Arc<MirrorStatus>,
    pool: BlockingPool,
}

impl VersionedRepository {
    /// Creates a repository with its own lock and worker pool.
    ///
    /// Use [`MirrorRegistry`](crate::MirrorRegistry) when several
    /// repositories run in one process.
    pub fn new(profile: ConnectionProfile) -> Self {
        Self::from_parts(profile, Arc::new(RwLock::new(())), BlockingPool::default())
    }

    pub(crate) fn from_parts(
        profile: ConnectionProfile,
        lock: Arc<RwLock<()>>,
        pool: BlockingPool,
    ) -> Self {
        Self {
            profile: Arc::new(profile),
            lock,
            status: Arc::new(MirrorStatus::new()),
            pool,
        }
    }

    /// Returns the connection profile.
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Returns the synchronization state.
    pub fn status(&self) -> &MirrorStatus {
        &self.status
    }

    /// Clones, fetches or re-clones the mirror.
    ///
    /// # Panics
    ///
    /// If the profile has an empty local path or remote URL.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_with_cancel(CancellationToken::new()).await
    }

    /// Like [`sync`](Self::sync); cancelling `cancel` aborts the transfer.
    ///
    /// A cancelled or timed-out sync may leave a partial mirror behind; the
    /// next sync detects it and re-clones.
    pub async fn sync_with_cancel(&self, cancel: CancellationToken) -> Result<SyncReport> {
        self.profile.assert_network_ready();
        let guard = Arc::clone(&self.lock).write_owned().await;
        self.sync_locked(guard, cancel).await
    }

    async fn sync_locked(
        &self,
        guard: OwnedRwLockWriteGuard<()>,
        cancel: CancellationToken,
    ) -> Result<SyncReport> {
        let profile = Arc::clone(&self.profile);
        let task_cancel = cancel.clone();

        let result = self
            .pool
            .run_with_timeout("sync", self.sync_timeout(), cancel, move || {
                let _guard = guard;
                MirrorManager::new(&profile, task_cancel).ensure_current()
            })
            .await;

        match &result {
            Ok(report) => self.status.record_success(report.tag_count),
            Err(e) => {
                warn!("Sync of {} failed: {}", self.profile.remote_url(), e);
                self.status.record_failure(e.to_string());
            },
        }

        result
    }

    /// A fetch may turn into a re-clone, so it gets both budgets.
    fn sync_timeout(&self) -> Duration {
        if self.has_mirror() {
            self.profile.fetch_timeout() + self.profile.clone_timeout()
        } else {
            self.profile.clone_timeout()
        }
    }

    fn has_mirror(&self) -> bool {
        self.profile.local_path().join(MARKER_DIR).is_dir()
    }

    /// Syncs before a read when the mirror was never synced or is older
    /// than the profile's `refreshAfter`.
    ///
    /// If that sync fails but a mirror existed before it, reads continue on
    /// it. A failed cold start is returned and retried by the next read.
    async fn ensure_fresh(&self) -> Result<()> {
        let refresh_after = self.profile.refresh_after();
        if !self.status.needs_sync(refresh_after) {
            return Ok(());
        }

        let guard = Arc::clone(&self.lock).write_owned().await;
        if !self.status.needs_sync(refresh_after) {
            return Ok(());
        }

        info!(
            "Mirror at {} is not current, syncing before read",
            self.profile.local_path().display()
        );
        self.profile.assert_network_ready();

        // a timed-out clone may leave a marker behind that it later rolls back
        let had_mirror = self.status.is_initialized() || self.has_mirror();

        match self.sync_locked(guard, CancellationToken::new()).await {
            Ok(_) => Ok(()),
            Err(e) if !matches!(e, MirrorError::Cancelled) && had_mirror && self.has_mirror() => {
                warn!(
                    "Serving existing mirror at {} after failed sync: {}",
                    self.profile.local_path().display(),
                    e
                );
                self.status.record_stale();
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    async fn read<F, T>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_fresh().await?;

        let guard = Arc::clone(&self.lock).read_owned().await;
        let path = self.profile.local_path().to_path_buf();

        self.pool
            .run(operation, move || {
                let _guard = guard;
                let repo = open_mirror(&path)?;
                f(&repo)
            })
            .await
    }

    /// Returns every commit tag, newest first.
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.read("list tags", |repo| TagIndex::new(repo).list()).await
    }

    /// Returns commit tag names, newest first.
    pub async fn list_tag_names(&self) -> Result<Vec<String>> {
        self.read("list tag names", |repo| TagIndex::new(repo).names())
            .await
    }

    /// Resolves one tag.
    ///
    /// # Errors
    ///
    /// `TagNotFound` or `NotACommit`.
    pub async fn resolve_tag(&self, tag: &str) -> Result<Tag> {
        let tag = tag.to_string();
        self.read("resolve tag", move |repo| TagIndex::new(repo).resolve(&tag))
            .await
    }

    /// Returns the names of tags strictly older than `tag`.
    ///
    /// # Errors
    ///
    /// `TagNotFound` for an unknown tag, `NotACommit` for a tag on a tree.
    pub async fn tags_older_than(&self, tag: &str) -> Result<Vec<String>> {
        let tag = tag.to_string();
        self.read("tags older than", move |repo| {
            TagIndex::new(repo).older_than(&tag)
        })
        .await
    }

    /// Returns the files at `tag` whose path contains `pattern`.
    pub async fn get_files_at_tag(&self, tag: &str, pattern: &str) -> Result<Vec<RetrievedFile>> {
        let tag = tag.to_string();
        let pattern = pattern.to_string();
        self.read("files at tag", move |repo| {
            ContentRetriever::new(repo).files_at_tag(&tag, &pattern)
        })
        .await
    }

    /// Returns true if a file or folder exists at `path` at `tag`.
    pub async fn is_path_present_at_tag(&self, tag: &str, path: &str) -> Result<bool> {
        let tag = tag.to_string();
        let path = path.to_string();
        self.read("path present", move |repo| {
            let commit = TagIndex::new(repo).commit(&tag)?;
            is_present(repo, &commit, &path)
        })
        .await
    }

    /// Returns true if `path` differs between the commits of two tags.
    pub async fn did_path_change_between_tags(
        &self,
        from_tag: &str,
        to_tag: &str,
        path: &str,
    ) -> Result<bool> {
        let from_tag = from_tag.to_string();
        let to_tag = to_tag.to_string();
        let path = path.to_string();
        self.read("path changed", move |repo| {
            let index = TagIndex::new(repo);
            let from = index.commit(&from_tag)?;
            let to = index.commit(&to_tag)?;
            changed_between(repo, &from, &to, &path)
        })
        .await
    }

    /// Fails with the last sync error, or when no mirror can be opened.
    pub async fn health_check(&self) -> Result<()> {
        if !self.status.is_healthy()
            && let Some(error) = self.status.last_error()
        {
            return Err(MirrorError::network(format!("last sync failed: {}", error)));
        }

        let guard = Arc::clone(&self.lock).read_owned().await;
        let path = self.profile.local_path().to_path_buf();
        self.pool
            .run("health check", move || {
                let _guard = guard;
                let repo = open_mirror(&path)?;
                let head = repo.head().ok().and_then(|head| head.target());
                debug!("Mirror at {} is readable, HEAD {:?}", path.display(), head);
                Ok(())
            })
            .await
    }
}

fn open_mirror(path: &Path) -> Result<Repository> {
    Repository::open(path).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            MirrorError::RepositoryNotFound(format!("no mirror at {}", path.display()))
        } else {
            engine(e)
        }
    })
}

#[async_trait]
impl VersionedSource for VersionedRepository {
    async fn ensure_current(&self) -> Result<()> {
        self.sync().await.map(|_| ())
    }

    async fn list_tag_names(&self) -> Result<Vec<String>> {
        VersionedRepository::list_tag_names(self).await
    }

    async fn tags_older_than(&self, tag: &str) -> Result<Vec<String>> {
        VersionedRepository::tags_older_than(self, tag).await
    }

    async fn get_files_at_tag(&self, tag: &str, pattern: &str) -> Result<Vec<RetrievedFile>> {
        VersionedRepository::get_files_at_tag(self, tag, pattern).await
    }

    async fn is_path_present_at_tag(&self, tag: &str, path: &str) -> Result<bool> {
        VersionedRepository::is_path_present_at_tag(self, tag, path).await
    }

    async fn did_path_change_between_tags(
        &self,
        from_tag: &str,
        to_tag: &str,
        path: &str,
    ) -> Result<bool> {
        VersionedRepository::did_path_change_between_tags(self, from_tag, to_tag, path).await
    }

    fn name(&self) -> &str {
        self.profile.remote_url()
    }

    async fn health_check(&self) -> Result<()> {
        VersionedRepository::health_check(self).await
    }
}

impl std::fmt::Debug for VersionedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedRepository")
            .field("remote_url", &self.profile.remote_url())
            .field("local_path", &self.profile.local_path())
            .field("healthy", &self.status.is_healthy())
            .finish()
    }
}
