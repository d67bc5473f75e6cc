//! The patch store: creates patches and applies every mutation to them.
//!
//! Each patch is one versioned record. Writers to the same patch are serialized by a
//! per-patch lock, and records are written with compare-and-set against the object
//! store, so that other processes sharing the store cannot be overwritten either. A
//! writer that loses the race reloads the patch and re-applies its change.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use shared::PublicKey;
use tracing::{debug, info, warn};

use super::{
    typename, Comment, CommentId, Field, Label, Patch, PatchId, Review, RevisionIndex, Status,
    Verdict, VerdictPolicy,
};
use crate::error::Error;
use crate::git::Oid;
use crate::object::{self, Timestamp, TypeName, Versioned};
use crate::store::ObjectStore;

/// Current version of the patch record format.
pub const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Record<P> {
    version: u32,
    patch: P,
}

/// Content of a patch at creation. Its hash is the patch id.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Init<'a> {
    typename: &'a TypeName,
    author: &'a PublicKey,
    base: Oid,
    head: Oid,
    title: &'a str,
    timestamp: Timestamp,
    nonce: u64,
}

/// Result of pushing a new head to a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// A revision was appended at this index.
    Revision(RevisionIndex),
    /// The head was already the patch head.
    NoOp,
}

/// Number of patches in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub draft: usize,
    pub open: usize,
    pub archived: usize,
    pub merged: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.draft + self.open + self.archived + self.merged
    }
}

pub struct Patches<S> {
    store: S,
    policy: VerdictPolicy,
    locks: Mutex<HashMap<PatchId, Arc<Mutex<()>>>>,
}

impl<S: ObjectStore> Patches<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, VerdictPolicy::default())
    }

    pub fn with_policy(store: S, policy: VerdictPolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> VerdictPolicy {
        self.policy
    }

    /// Open a patch. Opening twice with the same arguments creates two patches.
    pub fn open(
        &self,
        title: impl ToString,
        description: impl ToString,
        base: Oid,
        head: Oid,
        author: &PublicKey,
    ) -> Result<PatchId, Error> {
        self.create(
            title.to_string(),
            description.to_string(),
            base,
            head,
            author,
            Status::Open,
        )
    }

    /// Open a patch as a draft.
    pub fn draft(
        &self,
        title: impl ToString,
        description: impl ToString,
        base: Oid,
        head: Oid,
        author: &PublicKey,
    ) -> Result<PatchId, Error> {
        self.create(
            title.to_string(),
            description.to_string(),
            base,
            head,
            author,
            Status::Draft,
        )
    }

    fn create(
        &self,
        title: String,
        description: String,
        base: Oid,
        head: Oid,
        author: &PublicKey,
        status: Status,
    ) -> Result<PatchId, Error> {
        let timestamp = Timestamp::now();
        let typename = typename();
        let init = Init {
            typename: &typename,
            author,
            base,
            head,
            title: &title,
            timestamp,
            nonce: fastrand::u64(..),
        };
        let id = self.store.write_blob(&object::encode(&init).map_err(object::Error::from)?)?;
        let patch = Patch::new(*author, title, description, status, head, base, timestamp);

        self.write(&id, &patch, None)?;
        info!(%id, %head, %status, "Patch created");

        Ok(id)
    }

    /// Push a new head to a patch.
    ///
    /// The head must be a fast-forward of the current head unless `force` is set. If
    /// no base is given, the base of the latest revision is kept.
    pub fn update(
        &self,
        id: &PatchId,
        head: Oid,
        base: Option<Oid>,
        message: impl ToString,
        force: bool,
        author: &PublicKey,
    ) -> Result<Update, Error> {
        let message = message.to_string();
        let update = self.modify(id, |patch| {
            let current = patch.head();
            if head == current {
                return Ok(Update::NoOp);
            }
            let fast_forward = self.store.is_descendant(head, current)?;
            if !fast_forward && !force {
                return Err(Error::NonFastForward { head, current });
            }
            let base = base.unwrap_or_else(|| patch.latest().base());
            let index = patch.revise(
                *author,
                head,
                base,
                message.clone(),
                !fast_forward,
                Timestamp::now(),
            );
            Ok(Update::Revision(index))
        })?;

        match update {
            Update::Revision(index) => info!(%id, %head, index, "Patch revision added"),
            Update::NoOp => debug!(%id, %head, "Patch head unchanged"),
        }
        Ok(update)
    }

    /// Move a patch to another status, following the legal transitions.
    pub fn transition(&self, id: &PatchId, to: Status) -> Result<(), Error> {
        self.modify(id, |patch| {
            patch.status = patch.status.transition(to)?;
            Ok(())
        })?;
        info!(%id, status = %to, "Patch status changed");

        Ok(())
    }

    /// Mark a draft as ready for review.
    pub fn ready(&self, id: &PatchId) -> Result<(), Error> {
        self.transition_from(id, Status::Draft, Status::Open)
    }

    pub fn archive(&self, id: &PatchId) -> Result<(), Error> {
        self.transition_from(id, Status::Open, Status::Archived)
    }

    pub fn unarchive(&self, id: &PatchId) -> Result<(), Error> {
        self.transition_from(id, Status::Archived, Status::Open)
    }

    fn transition_from(&self, id: &PatchId, from: Status, to: Status) -> Result<(), Error> {
        self.modify(id, |patch| {
            if patch.status != from {
                return Err(Error::InvalidStatusTransition {
                    from: patch.status,
                    to,
                });
            }
            patch.status = from.transition(to)?;
            Ok(())
        })?;
        info!(%id, status = %to, "Patch status changed");

        Ok(())
    }

    /// Mark every open patch whose head is contained in `tip` as merged.
    ///
    /// Returns the patches that were merged by this call; running it again with the
    /// same tip returns nothing.
    pub fn merged(&self, tip: Oid) -> Result<Vec<PatchId>, Error> {
        let mut merged = Vec::new();

        for (id, patch) in self.all()? {
            if patch.status() != Status::Open {
                continue;
            }
            let head = patch.head();
            if head != tip && !self.store.is_descendant(tip, head)? {
                continue;
            }
            let transitioned = self.modify(&id, |patch| {
                // Re-check under the lock; the patch may have moved on since listing.
                if patch.status != Status::Open || patch.head() != head {
                    return Ok(false);
                }
                patch.status = Status::Merged;
                Ok(true)
            })?;

            if transitioned {
                info!(%id, %head, %tip, "Patch merged");
                merged.push(id);
            }
        }
        Ok(merged)
    }

    pub fn edit_title(
        &self,
        id: &PatchId,
        title: impl ToString,
        author: &PublicKey,
    ) -> Result<(), Error> {
        self.edit(id, Field::Title, title.to_string(), author)
    }

    pub fn edit_description(
        &self,
        id: &PatchId,
        description: impl ToString,
        author: &PublicKey,
    ) -> Result<(), Error> {
        self.edit(id, Field::Description, description.to_string(), author)
    }

    fn edit(&self, id: &PatchId, field: Field, body: String, author: &PublicKey) -> Result<(), Error> {
        self.modify(id, |patch| {
            patch.edit(*author, field, body.clone(), Timestamp::now());
            Ok(())
        })?;
        debug!(%id, ?field, "Patch edited");

        Ok(())
    }

    /// Add and remove labels. Labels in both sets end up removed.
    pub fn label(
        &self,
        id: &PatchId,
        add: impl IntoIterator<Item = Label>,
        remove: impl IntoIterator<Item = Label>,
    ) -> Result<(), Error> {
        let add = add.into_iter().collect::<Vec<_>>();
        let remove = remove.into_iter().collect::<Vec<_>>();

        self.modify(id, |patch| {
            patch.labels.extend(add.iter().cloned());
            for label in &remove {
                patch.labels.remove(label);
            }
            Ok(())
        })?;
        debug!(%id, "Patch labels updated");

        Ok(())
    }

    /// Add and remove assignees. Keys in both sets end up removed.
    pub fn assign(
        &self,
        id: &PatchId,
        add: impl IntoIterator<Item = PublicKey>,
        remove: impl IntoIterator<Item = PublicKey>,
    ) -> Result<(), Error> {
        let add = add.into_iter().collect::<Vec<_>>();
        let remove = remove.into_iter().collect::<Vec<_>>();

        self.modify(id, |patch| {
            patch.assignees.extend(add.iter().copied());
            for key in &remove {
                patch.assignees.remove(key);
            }
            Ok(())
        })?;
        debug!(%id, "Patch assignees updated");

        Ok(())
    }

    /// Give a verdict on a revision, replacing the reviewer's earlier one.
    pub fn review(
        &self,
        id: &PatchId,
        revision: RevisionIndex,
        reviewer: &PublicKey,
        verdict: Verdict,
        summary: Option<String>,
    ) -> Result<(), Error> {
        self.modify(id, |patch| {
            let r = patch
                .revision_mut(revision)
                .ok_or(Error::RevisionNotFound(*id, revision))?;
            r.set_review(
                *reviewer,
                Review::new(verdict, summary.clone(), Timestamp::now()),
            );
            Ok(())
        })?;
        info!(%id, revision, %reviewer, %verdict, "Patch reviewed");

        Ok(())
    }

    /// Comment on a revision, optionally replying to a comment of the same revision.
    pub fn comment(
        &self,
        id: &PatchId,
        revision: RevisionIndex,
        author: &PublicKey,
        body: impl ToString,
        reply_to: Option<CommentId>,
    ) -> Result<CommentId, Error> {
        let body = body.to_string();
        let comment = self.modify(id, |patch| {
            let r = patch
                .revision_mut(revision)
                .ok_or(Error::RevisionNotFound(*id, revision))?;

            if let Some(parent) = reply_to {
                if r.comment(&parent).is_none() {
                    return Err(Error::ReferenceNotFound(parent));
                }
            }
            let comment = Comment::new(
                id,
                revision,
                r.comments().len(),
                *author,
                body.clone(),
                reply_to,
                Timestamp::now(),
            )?;
            let comment_id = comment.id;
            r.push_comment(comment);

            Ok(comment_id)
        })?;
        debug!(%id, revision, %comment, "Patch comment added");

        Ok(comment)
    }

    /// The effective verdicts on the latest revision, according to the verdict policy.
    pub fn verdicts(&self, id: &PatchId) -> Result<BTreeMap<PublicKey, Verdict>, Error> {
        let patch = self.get(id)?.ok_or(Error::PatchNotFound(*id))?;

        Ok(self.policy.verdicts(&patch))
    }

    pub fn get(&self, id: &PatchId) -> Result<Option<Patch>, Error> {
        Ok(self.load(id)?.map(|v| v.value))
    }

    /// All patches, ordered by id.
    pub fn all(&self) -> Result<Vec<(PatchId, Patch)>, Error> {
        let mut patches = Vec::new();

        for id in object::ids(&self.store, &typename())? {
            let id = match id.parse::<PatchId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(%id, "Skipping patch with invalid id: {}", e);
                    continue;
                }
            };
            if let Some(patch) = self.get(&id)? {
                patches.push((id, patch));
            }
        }
        Ok(patches)
    }

    pub fn counts(&self) -> Result<Counts, Error> {
        let mut counts = Counts::default();

        for (_, patch) in self.all()? {
            match patch.status() {
                Status::Draft => counts.draft += 1,
                Status::Open => counts.open += 1,
                Status::Archived => counts.archived += 1,
                Status::Merged => counts.merged += 1,
            }
        }
        Ok(counts)
    }

    fn load(&self, id: &PatchId) -> Result<Option<Versioned<Patch>>, Error> {
        let record = object::load::<_, Record<serde_json::Value>>(
            &self.store,
            &typename(),
            &id.to_string(),
        )?;
        let Versioned { version, value } = match record {
            Some(record) => record,
            None => return Ok(None),
        };
        if value.version != VERSION {
            return Err(Error::Version(value.version));
        }
        let patch = serde_json::from_value(value.patch).map_err(object::Error::from)?;

        Ok(Some(Versioned {
            version,
            value: patch,
        }))
    }

    fn write(&self, id: &PatchId, patch: &Patch, previous: Option<Oid>) -> Result<Oid, Error> {
        let record = Record {
            version: VERSION,
            patch,
        };
        let version = object::save(&self.store, &typename(), &id.to_string(), &record, previous)?;

        Ok(version)
    }

    /// Apply a change to a patch and store the result.
    ///
    /// The change runs against the latest stored state. If `f` fails, nothing is
    /// written. If another writer stored a new version in between, `f` is applied
    /// again to that version.
    fn modify<T, F>(&self, id: &PatchId, mut f: F) -> Result<T, Error>
    where
        F: FnMut(&mut Patch) -> Result<T, Error>,
    {
        let lock = self.lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let Versioned { version, value } = self.load(id)?.ok_or(Error::PatchNotFound(*id))?;
            let mut patch = value.clone();
            let output = f(&mut patch)?;

            if patch == value {
                return Ok(output);
            }
            match self.write(id, &patch, Some(version)) {
                Ok(_) => return Ok(output),
                Err(e) if e.is_conflict() => {
                    debug!(%id, "Patch was modified concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn lock(&self, id: &PatchId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        locks.entry(*id).or_default().clone()
    }
}
