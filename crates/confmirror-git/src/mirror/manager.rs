//! Local mirror lifecycle: clone, fetch-in-place and re-clone.
//!
//! All methods block; the async facade runs them on the worker pool while
//! holding the profile's write lock.

use std::fs;

use confmirror_core::{ConnectionProfile, MirrorError, Result};
use git2::build::RepoBuilder;
use git2::{AutotagOption, FetchOptions, FetchPrune, RemoteCallbacks, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::attempt::{AttemptsExhausted, run_attempts};
use super::cleanup::{clear_dir_contents, remove_dir_all};
use crate::credentials::{CredentialMode, CredentialProvider};
use crate::error::{classify, engine};
use crate::transport::{
    Attempt, FallbackRegistration, Route, SmartHttpClient, TransportResolver,
    native_transport_guard,
};

/// Name of the directory whose presence marks an existing mirror.
pub const MARKER_DIR: &str = ".git";

/// What `ensure_current` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// No mirror existed; a full clone was made.
    Cloned,
    /// The mirror was fetched in place.
    Fetched,
    /// The mirror was unusable and was deleted and cloned again.
    Recloned,
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: SyncKind,
    /// The attempt that succeeded.
    pub attempt: Attempt,
    /// Number of tag refs in the mirror afterwards.
    pub tag_count: usize,
}

/// What is on disk at the mirror path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorState {
    /// No marker directory.
    Missing,
    /// A mirror of the profile's remote, fetched through `remote`.
    Usable { remote: String },
    /// A marker exists but the mirror cannot be fetched into.
    Unusable(String),
}

/// Owns the filesystem lifecycle of one profile's mirror.
pub struct MirrorManager<'a> {
    profile: &'a ConnectionProfile,
    credentials: CredentialProvider,
    cancel: CancellationToken,
}

impl<'a> MirrorManager<'a> {
    pub fn new(profile: &'a ConnectionProfile, cancel: CancellationToken) -> Self {
        Self {
            profile,
            credentials: CredentialProvider::from_profile(profile),
            cancel,
        }
    }

    /// Makes sure the mirror exists and reflects the remote.
    ///
    /// # Panics
    ///
    /// If the profile has an empty local path or remote URL.
    pub fn ensure_current(&self) -> Result<SyncReport> {
        self.profile.assert_network_ready();
        if self.cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        let path = self.profile.local_path();
        let (kind, attempt) = match self.inspect() {
            MirrorState::Missing => {
                info!(
                    "No mirror at {}, cloning {}",
                    path.display(),
                    self.profile.remote_url()
                );
                (SyncKind::Cloned, self.clone_fresh()?)
            },
            MirrorState::Usable { remote } => {
                info!("Fetching {} into {}", remote, path.display());
                match self.fetch_in_place(&remote) {
                    Ok(attempt) => (SyncKind::Fetched, attempt),
                    Err(MirrorError::Engine(reason)) => {
                        warn!(
                            "Fetch into {} failed on local state ({}), deleting and re-cloning",
                            path.display(),
                            reason
                        );
                        remove_dir_all(path)?.into_result(path)?;
                        (SyncKind::Recloned, self.clone_fresh()?)
                    },
                    Err(e) => return Err(e),
                }
            },
            MirrorState::Unusable(reason) => {
                warn!(
                    "Mirror at {} is unusable ({}), deleting and re-cloning",
                    path.display(),
                    reason
                );
                remove_dir_all(path)?.into_result(path)?;
                (SyncKind::Recloned, self.clone_fresh()?)
            },
        };

        let tag_count = self.count_tags()?;
        info!(
            "Mirror at {} is current ({:?} via {} attempt, {} tags)",
            path.display(),
            kind,
            attempt,
            tag_count
        );

        Ok(SyncReport {
            kind,
            attempt,
            tag_count,
        })
    }

    /// Decides between clone, fetch and re-clone.
    pub fn inspect(&self) -> MirrorState {
        let path = self.profile.local_path();
        if !path.join(MARKER_DIR).is_dir() {
            return MirrorState::Missing;
        }

        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(e) => return MirrorState::Unusable(format!("cannot open: {}", e.message())),
        };

        let remotes = match repo.remotes() {
            Ok(remotes) => remotes,
            Err(e) => return MirrorState::Unusable(format!("cannot list remotes: {}", e.message())),
        };
        let Some(name) = remotes.get(0) else {
            return MirrorState::Unusable("no remote configured".to_string());
        };

        let url = match repo.find_remote(name) {
            Ok(remote) => remote.url().map(str::to_string),
            Err(e) => return MirrorState::Unusable(format!("remote {}: {}", name, e.message())),
        };

        match url {
            Some(url) if same_remote(&url, self.profile.remote_url()) => {},
            Some(url) => {
                return MirrorState::Unusable(format!(
                    "remote {} points to {}, expected {}",
                    name,
                    url,
                    self.profile.remote_url()
                ));
            },
            None => return MirrorState::Unusable(format!("remote {} has no URL", name)),
        }

        if repo.is_empty().unwrap_or(true) {
            return MirrorState::Unusable("mirror has no commits".to_string());
        }

        MirrorState::Usable {
            remote: name.to_string(),
        }
    }

    fn clone_fresh(&self) -> Result<Attempt> {
        let path = self.profile.local_path();
        fs::create_dir_all(path).map_err(|e| MirrorError::filesystem(path, e.to_string()))?;

        let plan = TransportResolver::new(self.profile).clone_plan();
        run_attempts("clone", &plan, |attempt, route| {
            // leftovers of an interrupted clone or of the failed primary
            clear_dir_contents(path)?.into_result(path)?;
            debug!("Clone {} attempt into {}", attempt, path.display());

            self.via_route(route, |mode| {
                let mut builder = RepoBuilder::new();
                builder.fetch_options(self.fetch_options(mode));
                builder.clone(self.profile.remote_url(), path).map(drop)
            })
        })
        .map_err(AttemptsExhausted::into_error)
    }

    fn fetch_in_place(&self, remote_name: &str) -> Result<Attempt> {
        let path = self.profile.local_path();
        let refspecs = [
            format!("+refs/heads/*:refs/remotes/{}/*", remote_name),
            "+refs/tags/*:refs/tags/*".to_string(),
        ];

        let plan = TransportResolver::new(self.profile).fetch_plan();
        run_attempts("fetch", &plan, |_, route| {
            self.via_route(route, |mode| {
                let repo = Repository::open(path)?;
                let dropped = drop_non_commit_tags(&repo)?;
                if dropped > 0 {
                    debug!("Dropped {} non-commit tags before fetch", dropped);
                }
                let mut remote = repo.find_remote(remote_name)?;
                let mut options = self.fetch_options(mode);
                options.prune(FetchPrune::On);
                remote.fetch(&refspecs, Some(&mut options), Some("confmirror: fetch"))
            })
        })
        .map_err(AttemptsExhausted::into_error)
    }

    /// Runs one engine operation over `route`.
    ///
    /// The smart-HTTP route registers the fallback transport around the
    /// operation and unregisters it before returning.
    fn via_route<F>(&self, route: Route, operation: F) -> Result<()>
    where
        F: FnOnce(CredentialMode) -> std::result::Result<(), git2::Error>,
    {
        let url = self.profile.remote_url();

        match route {
            Route::Native(mode) => {
                let _shared = native_transport_guard(self.profile.http_timeout());
                operation(mode).map_err(|e| classify(&e, url, &self.cancel))
            },
            Route::SmartHttp { scheme } => {
                let client = SmartHttpClient::new(
                    self.profile.http_timeout(),
                    self.credentials.explicit().clone(),
                    self.cancel.clone(),
                )?;
                let registration = FallbackRegistration::register(scheme, client)?;

                operation(CredentialMode::Explicit).map_err(|e| {
                    match registration.failure().take() {
                        Some(failure) => MirrorError::from(failure),
                        None => classify(&e, url, &self.cancel),
                    }
                })
            },
        }
    }

    fn fetch_options(&self, mode: CredentialMode) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(self.credentials.callback(mode));

        let cancel = self.cancel.clone();
        callbacks.transfer_progress(move |_| !cancel.is_cancelled());
        let cancel = self.cancel.clone();
        callbacks.sideband_progress(move |_| !cancel.is_cancelled());

        let mut options = FetchOptions::new();
        options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::All);
        options
    }

    fn count_tags(&self) -> Result<usize> {
        let repo = Repository::open(self.profile.local_path()).map_err(engine)?;
        let tags = repo.tag_names(None).map_err(engine)?;
        Ok(tags.len())
    }
}

/// Deletes local tags that do not peel to a commit.
///
/// Fetch negotiation walks every local ref and fails on one naming a tree
/// or blob. The fetch's tag refspec writes them back afterwards.
fn drop_non_commit_tags(repo: &Repository) -> std::result::Result<usize, git2::Error> {
    let names = repo.tag_names(None)?;
    let mut dropped = 0;

    for name in names.iter().flatten() {
        let mut reference = repo.find_reference(&format!("refs/tags/{}", name))?;
        if reference.peel_to_commit().is_err() {
            reference.delete()?;
            dropped += 1;
        }
    }

    Ok(dropped)
}

/// Compares remote URLs, ignoring a trailing slash.
fn same_remote(actual: &str, expected: &str) -> bool {
    actual.trim_end_matches('/') == expected.trim_end_matches('/')
}
