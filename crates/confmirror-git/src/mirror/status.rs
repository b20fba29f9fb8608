//! Mirror synchronization state.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Tracks the synchronization state of one mirror.
#[derive(Debug, Default)]
pub struct MirrorStatus {
    /// The last successful sync.
    last_sync: RwLock<Option<Instant>>,
    /// Since when an existing mirror is served after a failed sync.
    stale_since: RwLock<Option<Instant>>,
    /// The last error message, if any.
    last_error: RwLock<Option<String>>,
    /// Number of consecutive failures.
    failure_count: RwLock<u32>,
    /// Number of tag refs after the last successful sync.
    tag_count: RwLock<usize>,
}

impl MirrorStatus {
    /// Creates a new MirrorStatus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time of the last successful sync.
    pub fn last_sync(&self) -> Option<Instant> {
        *self.last_sync.read()
    }

    /// Records a successful sync.
    pub fn record_success(&self, tag_count: usize) {
        let mut last_sync = self.last_sync.write();
        let mut stale_since = self.stale_since.write();
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();
        let mut tags = self.tag_count.write();

        *last_sync = Some(Instant::now());
        *stale_since = None;
        *last_error = None;
        *failure_count = 0;
        *tags = tag_count;
    }

    /// Records a failed sync.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *last_error = Some(error.into());
        *failure_count += 1;
    }

    /// Records that reads continue on the existing mirror after a failed sync.
    pub fn record_stale(&self) {
        *self.stale_since.write() = Some(Instant::now());
    }

    /// Returns true while an out-of-date mirror is being served.
    pub fn is_stale(&self) -> bool {
        self.stale_since.read().is_some()
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        *self.failure_count.read()
    }

    /// Returns the number of tag refs seen by the last successful sync.
    pub fn tag_count(&self) -> usize {
        *self.tag_count.read()
    }

    /// Returns true once a sync has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.last_sync.read().is_some()
    }

    /// Returns true if the mirror is synced and the last sync succeeded.
    pub fn is_healthy(&self) -> bool {
        self.is_initialized() && self.last_error.read().is_none()
    }

    /// Returns true if a read must sync the mirror first.
    ///
    /// A mirror that never synced always needs it. Without `refresh_after`
    /// one sync (or one stale fallback) per process is enough.
    pub fn needs_sync(&self, refresh_after: Option<Duration>) -> bool {
        let reference = self.last_sync().or(*self.stale_since.read());

        match (reference, refresh_after) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(at), Some(after)) => at.elapsed() >= after,
        }
    }
}
