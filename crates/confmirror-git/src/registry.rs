//! One repository per mirror path, sharing one worker pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use confmirror_core::ConnectionProfile;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::info;

use crate::blocking::BlockingPool;
use crate::repository::VersionedRepository;

struct Entry {
    lock: Arc<RwLock<()>>,
    repository: Arc<VersionedRepository>,
}

/// Hands out [`VersionedRepository`] values keyed by absolute mirror path.
///
/// Profiles for different paths never contend. Registering a different
/// profile for a known path (a firmware repository rebound to another
/// remote) replaces the repository but keeps the path's lock, so the old
/// and new binding never touch the directory at the same time.
pub struct MirrorRegistry {
    pool: BlockingPool,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl MirrorRegistry {
    /// Creates a registry whose repositories share `workers` blocking workers.
    pub fn new(workers: usize) -> Self {
        Self {
            pool: BlockingPool::new(workers),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the repository for `profile`, creating or rebinding it.
    pub fn register(&self, profile: ConnectionProfile) -> Arc<VersionedRepository> {
        let mut entries = self.entries.lock();
        let path = profile.local_path().to_path_buf();

        match entries.get_mut(&path) {
            Some(entry) if entry.repository.profile() == &profile => {
                Arc::clone(&entry.repository)
            },
            Some(entry) => {
                info!(
                    "Rebinding mirror {} from {} to {}",
                    path.display(),
                    entry.repository.profile().remote_url(),
                    profile.remote_url()
                );
                let repository = Arc::new(VersionedRepository::from_parts(
                    profile,
                    Arc::clone(&entry.lock),
                    self.pool.clone(),
                ));
                entry.repository = Arc::clone(&repository);
                repository
            },
            None => {
                let lock = Arc::new(RwLock::new(()));
                let repository = Arc::new(VersionedRepository::from_parts(
                    profile,
                    Arc::clone(&lock),
                    self.pool.clone(),
                ));
                entries.insert(
                    path,
                    Entry {
                        lock,
                        repository: Arc::clone(&repository),
                    },
                );
                repository
            },
        }
    }

    /// Returns the repository currently bound to `path`.
    pub fn get(&self, path: &Path) -> Option<Arc<VersionedRepository>> {
        self.entries
            .lock()
            .get(path)
            .map(|entry| Arc::clone(&entry.repository))
    }

    /// Returns the number of mirror paths.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MirrorRegistry {
    fn default() -> Self {
        Self::new(crate::blocking::DEFAULT_WORKERS)
    }
}

impl std::fmt::Debug for MirrorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorRegistry")
            .field("workers", &self.pool.workers())
            .field("mirrors", &self.len())
            .finish()
    }
}
