//! Patches on top of a content-addressed object store.
//!
//! A patch is opened by pushing to the intake reference, and every later push of a
//! new head appends a revision. Reviews and comments attach to revisions. See
//! [`push::Translator`] for the push entry point and [`patch::Patches`] for direct
//! manipulation.
pub mod error;
pub mod git;
pub mod object;
pub mod patch;
pub mod push;
pub mod store;

#[cfg(any(test, feature = "test"))]
pub mod test;

pub use error::Error;
pub use git::Oid;
pub use patch::{Patch, PatchId, Patches, Revision, RevisionIndex, Status, Update};
pub use push::{Outcome, Push, Translator};
pub use store::{GitStore, MemoryStore, ObjectStore};
