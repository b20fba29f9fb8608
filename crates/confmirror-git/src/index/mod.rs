//! The Tag Index.
//!
//! Tags are recomputed from the mirror on every query; nothing is cached.

mod paths;
mod tags;

pub use paths::{changed_between, entry_id, is_present, normalize_path};
pub use tags::{Peeled, TagIndex};
