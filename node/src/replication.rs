//! Policy-gated replication.
//!
//! The transport moves objects in batches. Before every batch, and once more before
//! the destination reference is updated, the seeding policy is consulted again. If
//! the policy no longer allows the transfer, it is aborted and the destination
//! reference is left untouched; objects already transferred stay unreferenced.
use std::io;

use shared::{NodeId, RepoId};

use crate::policy::Policies;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The policy was revoked during the transfer. The next attempt starts clean.
    #[error("replication of {rid} aborted by policy after {batches} batch(es)")]
    ReplicationAborted { rid: RepoId, batches: usize },
    #[error("transfer failed: {0}")]
    Transfer(#[from] io::Error),
}

impl Error {
    /// Whether this is a policy cancellation rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::ReplicationAborted { .. })
    }
}

/// The transport side of a replication.
pub trait Transfer {
    /// Transfer the next batch of objects. Returns `false` once everything was
    /// transferred.
    fn fetch_batch(&mut self) -> io::Result<bool>;

    /// Point the destination reference at the transferred content.
    fn land(&mut self) -> io::Result<()>;
}

/// Replicate the content of `author` in `rid`. Returns the number of batches fetched.
pub fn replicate<T: Transfer>(
    policies: &Policies,
    rid: &RepoId,
    author: &NodeId,
    transfer: &mut T,
) -> Result<usize, Error> {
    let mut batches = 0;

    loop {
        checkpoint(policies, rid, author, batches)?;

        if !transfer.fetch_batch()? {
            break;
        }
        batches += 1;
        log::trace!("Fetched batch {} of {} from {}", batches, rid, author);
    }
    checkpoint(policies, rid, author, batches)?;
    transfer.land()?;

    log::debug!("Replicated {} from {} in {} batch(es)", rid, author, batches);

    Ok(batches)
}

fn checkpoint(
    policies: &Policies,
    rid: &RepoId,
    author: &NodeId,
    batches: usize,
) -> Result<(), Error> {
    if policies.should_replicate(rid, author) {
        return Ok(());
    }
    log::warn!(
        "Aborting replication of {} from {} after {} batch(es): not allowed by policy",
        rid,
        author,
        batches
    );
    Err(Error::ReplicationAborted { rid: *rid, batches })
}
