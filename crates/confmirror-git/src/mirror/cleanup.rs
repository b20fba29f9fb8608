//! Deleting mirror directories.
//!
//! Object files are written read-only and other processes (indexers, virus
//! scanners, a second tool instance) may hold files open. Removal clears the
//! read-only bit, retries a locked file a bounded number of times, and then
//! skips it so the rest of the tree is still removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use confmirror_core::{MirrorError, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Attempts per entry before a locked file is skipped.
const REMOVE_ATTEMPTS: u32 = 5;

/// Delay before the first retry; doubled on every further retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// What a cleanup removed and what it had to leave behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files and directories deleted.
    pub removed: usize,
    /// Entries left in place because they stayed locked.
    pub skipped: Vec<PathBuf>,
}

impl CleanupReport {
    /// Returns true when everything was removed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Turns skipped entries into a filesystem error for `dir`.
    pub fn into_result(self, dir: &Path) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }

        let sample: Vec<String> = self
            .skipped
            .iter()
            .take(3)
            .map(|p| p.display().to_string())
            .collect();

        Err(MirrorError::filesystem(
            dir,
            format!(
                "{} entries are locked by another process (e.g. {})",
                self.skipped.len(),
                sample.join(", ")
            ),
        ))
    }
}

/// Removes everything inside `dir`, keeping `dir` itself.
///
/// A missing directory is an empty report.
pub fn clear_dir_contents(dir: &Path) -> Result<CleanupReport> {
    remove_tree(dir, 1)
}

/// Removes `dir` and everything below it.
pub fn remove_dir_all(dir: &Path) -> Result<CleanupReport> {
    remove_tree(dir, 0)
}

fn remove_tree(dir: &Path, min_depth: usize) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    if !dir.exists() {
        return Ok(report);
    }

    for entry in WalkDir::new(dir).min_depth(min_depth).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue;
            },
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                return Err(MirrorError::filesystem(path, e.to_string()));
            },
        };

        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        if is_dir && report.skipped.iter().any(|skipped| skipped.starts_with(path)) {
            // holds a locked file, cannot be empty
            continue;
        }

        match remove_with_retry(path, is_dir) {
            Ok(()) => report.removed += 1,
            Err(e) if is_locked(&e) => {
                warn!("Skipping locked entry {}: {}", path.display(), e);
                report.skipped.push(path.to_path_buf());
            },
            Err(e) => return Err(MirrorError::filesystem(path, e.to_string())),
        }
    }

    debug!(
        "Cleaned {}: {} removed, {} skipped",
        dir.display(),
        report.removed,
        report.skipped.len()
    );

    Ok(report)
}

fn remove_with_retry(path: &Path, is_dir: bool) -> io::Result<()> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        let result = if is_dir {
            fs::remove_dir(path)
        } else {
            clear_readonly(path).and_then(|()| fs::remove_file(path))
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if is_locked(&e) && attempt < REMOVE_ATTEMPTS => {
                debug!(
                    "{} is locked (attempt {}/{}), retrying in {:?}",
                    path.display(),
                    attempt,
                    REMOVE_ATTEMPTS,
                    backoff
                );
                thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Sharing and lock violations on Windows, busy/permission errors elsewhere.
fn is_locked(err: &io::Error) -> bool {
    if cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)) {
        return true;
    }

    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}
