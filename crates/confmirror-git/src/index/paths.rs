//! Path queries against the tree of a tag.

use confmirror_core::Result;
use git2::{Commit, Oid, Repository};
use tracing::debug;

use crate::content::{EntryKind, TreeWalker, WalkControl};
use crate::error::engine;

/// Normalizes a repository-relative path: `\` becomes `/`, surrounding and
/// repeated separators are dropped.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the object id at `path` in `commit`'s tree, if present.
///
/// The empty path is the root tree.
pub fn entry_id(repo: &Repository, commit: &Commit<'_>, path: &str) -> Result<Option<Oid>> {
    let target = normalize_path(path);
    let tree = commit.tree().map_err(engine)?;

    if target.is_empty() {
        return Ok(Some(tree.id()));
    }

    let mut found = None;
    TreeWalker::new(repo).walk(&tree, |entry| {
        if entry.path == target {
            found = Some(entry.id);
            return Ok(WalkControl::Stop);
        }

        let on_the_way = entry.kind == EntryKind::Tree
            && target.len() > entry.path.len()
            && target.starts_with(&entry.path)
            && target.as_bytes()[entry.path.len()] == b'/';

        Ok(if on_the_way {
            WalkControl::Continue
        } else {
            WalkControl::SkipSubtree
        })
    })?;

    Ok(found)
}

/// Returns true if a file or folder exists at `path` in `commit`.
pub fn is_present(repo: &Repository, commit: &Commit<'_>, path: &str) -> Result<bool> {
    Ok(entry_id(repo, commit, path)?.is_some())
}

/// Returns true if the object at `path` differs between two commits.
///
/// Appearing or disappearing counts as a change; a folder changed when any
/// file below it did.
pub fn changed_between(
    repo: &Repository,
    from: &Commit<'_>,
    to: &Commit<'_>,
    path: &str,
) -> Result<bool> {
    let before = entry_id(repo, from, path)?;
    let after = entry_id(repo, to, path)?;

    debug!("Path {} at {} -> {}: {:?} -> {:?}", path, from.id(), to.id(), before, after);
    Ok(before != after)
}
