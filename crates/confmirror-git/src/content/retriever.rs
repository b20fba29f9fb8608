//! The Content Retriever: files as they existed at a tag.

use confmirror_core::{Result, RetrievedFile};
use git2::{Commit, Oid, Repository, Sort};
use tracing::{debug, warn};

use super::walk::{EntryKind, TreeWalker, WalkControl};
use crate::error::engine;
use crate::index::{Peeled, TagIndex};

/// Reads blobs out of an open mirror.
pub struct ContentRetriever<'r> {
    repo: &'r Repository,
}

impl<'r> ContentRetriever<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// Returns every file at `tag` whose path contains `pattern`, ignoring
    /// case. An empty pattern matches everything.
    ///
    /// A tag on a tree or blob yields no files. Order follows the tree walk
    /// and carries no meaning.
    pub fn files_at_tag(&self, tag: &str, pattern: &str) -> Result<Vec<RetrievedFile>> {
        let target = match TagIndex::new(self.repo).peel(tag)? {
            Peeled::Commit(commit) => commit.id(),
            Peeled::Other(kind) => {
                debug!("Tag {} peels to {:?}, no files", tag, kind);
                return Ok(Vec::new());
            },
        };

        let Some(commit) = self.find_in_history(target)? else {
            warn!("Commit {} of tag {} is not reachable from any ref", target, tag);
            return Ok(Vec::new());
        };

        let needle = pattern.to_lowercase();
        let tree = commit.tree().map_err(engine)?;
        let mut files = Vec::new();

        TreeWalker::new(self.repo).walk(&tree, |entry| {
            if entry.kind == EntryKind::Blob && entry.path.to_lowercase().contains(&needle) {
                let blob = self.repo.find_blob(entry.id).map_err(engine)?;
                files.push(RetrievedFile::from_blob(entry.path.clone(), blob.content()));
            }
            Ok(WalkControl::Continue)
        })?;

        debug!(
            "Retrieved {} files matching '{}' at {}",
            files.len(),
            pattern,
            tag
        );
        Ok(files)
    }

    /// Walks every commit reachable from any ref looking for `id`.
    fn find_in_history(&self, id: Oid) -> Result<Option<Commit<'r>>> {
        let mut revwalk = self.repo.revwalk().map_err(engine)?;
        revwalk.set_sorting(Sort::TIME).map_err(engine)?;
        revwalk.push_glob("*").map_err(engine)?;
        // a detached HEAD is not under refs/
        let _ = revwalk.push_head();

        for oid in revwalk {
            let oid = oid.map_err(engine)?;
            if oid == id {
                return self.repo.find_commit(oid).map(Some).map_err(engine);
            }
        }

        Ok(None)
    }
}
