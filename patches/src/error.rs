use thiserror::Error;

use crate::git::Oid;
use crate::patch::{CommentId, PatchId, RevisionIndex, Status};
use crate::{object, store};

/// Errors returned by patch operations. Every error leaves the patch unchanged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("patch {0} not found")]
    PatchNotFound(PatchId),
    #[error("revision {1} of patch {0} not found")]
    RevisionNotFound(PatchId, RevisionIndex),
    /// The caller may retry with force, or rebase first.
    #[error("{head} is not a fast-forward of {current}")]
    NonFastForward { head: Oid, current: Oid },
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: Status, to: Status },
    #[error("comment {0} not found")]
    ReferenceNotFound(CommentId),
    #[error("unsupported patch record version {0}")]
    Version(u32),
    #[error(transparent)]
    Object(#[from] object::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
}

impl Error {
    /// Whether the error is a lost compare-and-set on the object store.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Object(e) => e.is_conflict(),
            Self::Store(e) => e.is_conflict(),
            _ => false,
        }
    }
}
