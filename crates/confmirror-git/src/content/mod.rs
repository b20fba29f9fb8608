//! The Content Retriever and the tree-walk primitive it shares with the
//! path queries.

mod retriever;
mod walk;

pub use retriever::ContentRetriever;
pub use walk::{EntryKind, MAX_TREE_DEPTH, TreeWalker, WalkControl, WalkEntry};
