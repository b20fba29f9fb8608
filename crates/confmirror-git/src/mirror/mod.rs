//! The Local Mirror Manager.
//!
//! Keeps a local working copy of a remote repository present and current,
//! and owns every mutation of the mirror directory.

mod attempt;
mod cleanup;
mod manager;
mod status;

pub use attempt::{AttemptsExhausted, run_attempts};
pub use cleanup::{CleanupReport, clear_dir_contents, remove_dir_all};
pub use manager::{MARKER_DIR, MirrorManager, MirrorState, SyncKind, SyncReport};
pub use status::MirrorStatus;
