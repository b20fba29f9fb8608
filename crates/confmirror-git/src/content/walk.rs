//! Breadth-first traversal of a commit's tree.
//!
//! The object graph belongs to the engine; the walker only reads it through
//! an explicit work-list, so a pathological tree can't exhaust the stack.

use std::collections::VecDeque;

use confmirror_core::{MirrorError, Result};
use git2::{ObjectType, Oid, Repository, Tree};

use crate::error::engine;

/// Maximum nesting of sub-trees below a root tree.
pub const MAX_TREE_DEPTH: usize = 64;

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// A submodule commit.
    Commit,
    Other,
}

impl From<Option<ObjectType>> for EntryKind {
    fn from(kind: Option<ObjectType>) -> Self {
        match kind {
            Some(ObjectType::Blob) => Self::Blob,
            Some(ObjectType::Tree) => Self::Tree,
            Some(ObjectType::Commit) => Self::Commit,
            _ => Self::Other,
        }
    }
}

/// One entry reached by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Repository-relative path, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
    pub id: Oid,
    /// 1 for entries of the root tree.
    pub depth: usize,
}

/// What the walker does after visiting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// Do not descend into this tree.
    SkipSubtree,
    /// End the walk.
    Stop,
}

/// Walks trees of one repository.
pub struct TreeWalker<'r> {
    repo: &'r Repository,
    max_depth: usize,
}

impl<'r> TreeWalker<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            max_depth: MAX_TREE_DEPTH,
        }
    }

    /// Overrides the depth guard.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Visits every entry below `root`, parents before children.
    ///
    /// # Errors
    ///
    /// [`MirrorError::TreeDepthExceeded`] when a tree that would be entered
    /// lies deeper than the guard, or whatever `visit` returns.
    pub fn walk<F>(&self, root: &Tree<'r>, mut visit: F) -> Result<()>
    where
        F: FnMut(&WalkEntry) -> Result<WalkControl>,
    {
        let mut pending: VecDeque<(String, Tree<'r>, usize)> = VecDeque::new();
        pending.push_back((String::new(), root.clone(), 1));

        while let Some((prefix, tree, depth)) = pending.pop_front() {
            for item in tree.iter() {
                let name = String::from_utf8_lossy(item.name_bytes());
                let path = if prefix.is_empty() {
                    name.into_owned()
                } else {
                    format!("{}/{}", prefix, name)
                };

                let entry = WalkEntry {
                    path,
                    kind: EntryKind::from(item.kind()),
                    id: item.id(),
                    depth,
                };

                match visit(&entry)? {
                    WalkControl::Stop => return Ok(()),
                    WalkControl::SkipSubtree => continue,
                    WalkControl::Continue => {},
                }

                if entry.kind != EntryKind::Tree {
                    continue;
                }

                if depth >= self.max_depth {
                    return Err(MirrorError::TreeDepthExceeded {
                        path: entry.path,
                        limit: self.max_depth,
                    });
                }

                let subtree = self.repo.find_tree(entry.id).map_err(engine)?;
                pending.push_back((entry.path, subtree, depth + 1));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::TempDir;

    /// Builds a commit tree `a/b/c/.../leaf.txt` with `levels` directories.
    fn nested_repo(levels: usize) -> (TempDir, Repository, Oid) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();

        let blob = repo.blob(b"leaf").unwrap();
        let mut tree_id = {
            let mut builder = repo.treebuilder(None).unwrap();
            builder.insert("leaf.txt", blob, 0o100644).unwrap();
            builder.write().unwrap()
        };

        for level in (0..levels).rev() {
            let mut builder = repo.treebuilder(None).unwrap();
            builder.insert(format!("d{}", level), tree_id, 0o040000).unwrap();
            let readme = repo.blob(format!("level {}", level).as_bytes()).unwrap();
            builder.insert("README", readme, 0o100644).unwrap();
            tree_id = builder.write().unwrap();
        }

        let commit = {
            let sig = Signature::now("Test", "test@example.com").unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "nested", &tree, &[])
                .unwrap()
        };
        (temp, repo, commit)
    }

    #[test]
    fn test_walk_visits_every_entry_with_paths() {
        let (_temp, repo, commit) = nested_repo(2);
        let tree = repo.find_commit(commit).unwrap().tree().unwrap();

        let mut seen = Vec::new();
        TreeWalker::new(&repo)
            .walk(&tree, |entry| {
                seen.push((entry.path.clone(), entry.kind, entry.depth));
                Ok(WalkControl::Continue)
            })
            .unwrap();

        assert!(seen.contains(&("d0".to_string(), EntryKind::Tree, 1)));
        assert!(seen.contains(&("d0/d1".to_string(), EntryKind::Tree, 2)));
        assert!(seen.contains(&("d0/d1/leaf.txt".to_string(), EntryKind::Blob, 3)));
        assert!(seen.contains(&("d0/README".to_string(), EntryKind::Blob, 2)));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_skip_subtree_and_stop() {
        let (_temp, repo, commit) = nested_repo(3);
        let tree = repo.find_commit(commit).unwrap().tree().unwrap();

        let mut seen = Vec::new();
        TreeWalker::new(&repo)
            .walk(&tree, |entry| {
                seen.push(entry.path.clone());
                Ok(if entry.kind == EntryKind::Tree {
                    WalkControl::SkipSubtree
                } else {
                    WalkControl::Continue
                })
            })
            .unwrap();
        assert_eq!(seen.len(), 2);

        let mut count = 0;
        TreeWalker::new(&repo)
            .walk(&tree, |_| {
                count += 1;
                Ok(WalkControl::Stop)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_depth_guard() {
        let (_temp, repo, commit) = nested_repo(5);
        let tree = repo.find_commit(commit).unwrap().tree().unwrap();

        let result = TreeWalker::new(&repo)
            .with_max_depth(3)
            .walk(&tree, |_| Ok(WalkControl::Continue));

        match result {
            Err(MirrorError::TreeDepthExceeded { path, limit }) => {
                assert_eq!(limit, 3);
                assert_eq!(path, "d0/d1/d2");
            },
            other => panic!("expected depth error, got {:?}", other),
        }

        assert!(
            TreeWalker::new(&repo)
                .walk(&tree, |_| Ok(WalkControl::Continue))
                .is_ok()
        );
    }
}
