//! The object store interface the patch core is written against.
//!
//! Storage of commits, blobs and references is an external collaborator. Two
//! implementations are provided: [`MemoryStore`], used in tests, and [`GitStore`],
//! backed by a git repository.
use std::sync::Arc;

use thiserror::Error;

use crate::git::Oid;

pub mod git;
pub mod memory;

pub use self::git::GitStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum Error {
    /// The reference did not have the expected previous value.
    #[error("reference '{0}' was modified concurrently")]
    Conflict(String),
    #[error("object {0} not found")]
    NotFound(Oid),
    #[error("git: {0}")]
    Git(#[from] git2::Error),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Content-addressed storage with compare-and-set references.
pub trait ObjectStore {
    /// Whether `commit` is a strict descendant of `ancestor`. A commit is not its own
    /// descendant.
    fn is_descendant(&self, commit: Oid, ancestor: Oid) -> Result<bool, Error>;

    /// The message of a commit.
    fn commit_message(&self, commit: Oid) -> Result<String, Error>;

    /// The target of a reference, if it exists.
    fn reference(&self, name: &str) -> Result<Option<Oid>, Error>;

    /// All references starting with `prefix`, sorted by name.
    fn references(&self, prefix: &str) -> Result<Vec<(String, Oid)>, Error>;

    /// Point `name` at `target`, provided it currently points at `previous`.
    /// `None` means the reference must not exist yet.
    fn update_reference(&self, name: &str, target: Oid, previous: Option<Oid>)
        -> Result<(), Error>;

    /// Write a blob and return its id.
    fn write_blob(&self, data: &[u8]) -> Result<Oid, Error>;

    /// Read a blob.
    fn blob(&self, oid: Oid) -> Result<Vec<u8>, Error>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn is_descendant(&self, commit: Oid, ancestor: Oid) -> Result<bool, Error> {
        (**self).is_descendant(commit, ancestor)
    }

    fn commit_message(&self, commit: Oid) -> Result<String, Error> {
        (**self).commit_message(commit)
    }

    fn reference(&self, name: &str) -> Result<Option<Oid>, Error> {
        (**self).reference(name)
    }

    fn references(&self, prefix: &str) -> Result<Vec<(String, Oid)>, Error> {
        (**self).references(prefix)
    }

    fn update_reference(
        &self,
        name: &str,
        target: Oid,
        previous: Option<Oid>,
    ) -> Result<(), Error> {
        (**self).update_reference(name, target, previous)
    }

    fn write_blob(&self, data: &[u8]) -> Result<Oid, Error> {
        (**self).write_blob(data)
    }

    fn blob(&self, oid: Oid) -> Result<Vec<u8>, Error> {
        (**self).blob(oid)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn is_descendant(&self, commit: Oid, ancestor: Oid) -> Result<bool, Error> {
        (**self).is_descendant(commit, ancestor)
    }

    fn commit_message(&self, commit: Oid) -> Result<String, Error> {
        (**self).commit_message(commit)
    }

    fn reference(&self, name: &str) -> Result<Option<Oid>, Error> {
        (**self).reference(name)
    }

    fn references(&self, prefix: &str) -> Result<Vec<(String, Oid)>, Error> {
        (**self).references(prefix)
    }

    fn update_reference(
        &self,
        name: &str,
        target: Oid,
        previous: Option<Oid>,
    ) -> Result<(), Error> {
        (**self).update_reference(name, target, previous)
    }

    fn write_blob(&self, data: &[u8]) -> Result<Oid, Error> {
        (**self).write_blob(data)
    }

    fn blob(&self, oid: Oid) -> Result<Vec<u8>, Error> {
        (**self).blob(oid)
    }
}
