//! Versioned source abstraction.

mod traits;

pub use traits::VersionedSource;
