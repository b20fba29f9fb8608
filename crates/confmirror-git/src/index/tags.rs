//! The Tag Index: tag enumeration, peeling and timeline queries.

use chrono::DateTime;
use confmirror_core::{MirrorError, Result, Tag};
use git2::{Commit, ErrorCode, ObjectType, Repository};
use tracing::debug;

use crate::error::engine;

/// A tag after following every level of indirection.
pub enum Peeled<'r> {
    Commit(Commit<'r>),
    /// A tree or blob; carries no timestamp.
    Other(Option<ObjectType>),
}

/// Read-only tag queries over an open mirror.
pub struct TagIndex<'r> {
    repo: &'r Repository,
}

impl<'r> TagIndex<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// Peels `name` to its final target.
    pub fn peel(&self, name: &str) -> Result<Peeled<'r>> {
        let reference = match self.repo.find_reference(&format!("refs/tags/{}", name)) {
            Ok(reference) => reference,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Err(MirrorError::tag_not_found(name));
            },
            Err(e) => return Err(engine(e)),
        };

        let object = reference.peel(ObjectType::Any).map_err(engine)?;
        match object.into_commit() {
            Ok(commit) => Ok(Peeled::Commit(commit)),
            Err(object) => Ok(Peeled::Other(object.kind())),
        }
    }

    /// Resolves `name` to a [`Tag`].
    ///
    /// # Errors
    ///
    /// `TagNotFound` for an unknown tag, `NotACommit` for a tag on a tree or
    /// blob.
    pub fn resolve(&self, name: &str) -> Result<Tag> {
        match self.peel(name)? {
            Peeled::Commit(commit) => Ok(to_tag(name, &commit)),
            Peeled::Other(_) => Err(MirrorError::NotACommit(name.to_string())),
        }
    }

    /// Returns the commit `name` peels to, or `NotACommit`.
    pub fn commit(&self, name: &str) -> Result<Commit<'r>> {
        match self.peel(name)? {
            Peeled::Commit(commit) => Ok(commit),
            Peeled::Other(_) => Err(MirrorError::NotACommit(name.to_string())),
        }
    }

    /// Every commit tag, newest first (ties by name, descending).
    pub fn list(&self) -> Result<Vec<Tag>> {
        let names = self.repo.tag_names(None).map_err(engine)?;
        let mut tags = Vec::with_capacity(names.len());

        for name in names.iter().flatten() {
            match self.peel(name)? {
                Peeled::Commit(commit) => tags.push(to_tag(name, &commit)),
                Peeled::Other(kind) => {
                    debug!("Excluding tag {} (peels to {:?})", name, kind);
                },
            }
        }

        tags.sort_by(Tag::timeline_order);
        debug!("Indexed {} of {} tags", tags.len(), names.len());
        Ok(tags)
    }

    /// Tag names in timeline order.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|tag| tag.name().to_string())
            .collect())
    }

    /// Names of all tags whose commit is strictly older than `name`'s.
    pub fn older_than(&self, name: &str) -> Result<Vec<String>> {
        let pivot = self.resolve(name)?;

        Ok(self
            .list()?
            .into_iter()
            .filter(|tag| tag.timestamp() < pivot.timestamp())
            .map(|tag| tag.name().to_string())
            .collect())
    }
}

fn to_tag(name: &str, commit: &Commit<'_>) -> Tag {
    let seconds = commit.author().when().seconds();
    Tag::new(
        name,
        commit.id().to_string(),
        DateTime::from_timestamp(seconds, 0).unwrap_or_default(),
    )
}
