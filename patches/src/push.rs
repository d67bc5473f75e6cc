//! Translation of pushed references into patch operations.
//!
//! A push may target one of three address classes (see [`crate::git::refs`]):
//!
//! * The intake reference opens a patch, or updates the patch previously opened from
//!   the same client branch.
//! * A canonical patch reference updates that patch.
//! * Object references are only ever written by this crate and are rejected.
//!
//! Pushes to the default branch trigger merge detection. Anything else is ignored.
use std::fmt;

use serde::{Deserialize, Serialize};
use shared::PublicKey;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::{refs, Oid};
use crate::object::{self, TypeName};
use crate::patch::{PatchId, Patches, RevisionIndex, Update};
use crate::store::{self, ObjectStore};

/// Type name of the records associating client branches with patches.
pub const INTAKE_TYPENAME: &str = "xyz.radicle.patch.intake";

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Patch(#[from] crate::Error),
    #[error(transparent)]
    Object(#[from] object::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("reference '{0}' is managed by the server and cannot be pushed to")]
    ProtectedRef(String),
    #[error("reference '{0}' cannot be deleted")]
    Delete(String),
    #[error("invalid reference '{0}'")]
    InvalidRef(String),
    #[error("invalid push option '{0}'")]
    InvalidOption(String),
}

/// The address class of a pushed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `refs/patches`.
    Intake,
    /// `refs/heads/patches/<id>`.
    Patch(PatchId),
    /// `refs/cobs/<type>/<id>`.
    Object(TypeName, String),
    /// `refs/heads/<name>`.
    Branch(String),
    Other,
}

impl Target {
    pub fn classify(refname: &str) -> Result<Self, Error> {
        if refname == refs::PATCHES {
            return Ok(Self::Intake);
        }
        if let Some(id) = refname.strip_prefix(refs::PATCH_HEADS) {
            let id = id
                .parse()
                .map_err(|_| Error::InvalidRef(refname.to_owned()))?;
            return Ok(Self::Patch(id));
        }
        if let Some(rest) = refname.strip_prefix(refs::COBS) {
            let (typename, id) = rest
                .split_once('/')
                .ok_or_else(|| Error::InvalidRef(refname.to_owned()))?;
            return Ok(Self::Object(TypeName::new(typename), id.to_owned()));
        }
        if let Some(branch) = refname.strip_prefix(refs::HEADS) {
            return Ok(Self::Branch(branch.to_owned()));
        }
        Ok(Self::Other)
    }
}

/// Options passed with `git push -o`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// `patch.message=<text>`: title and description, or revision message.
    pub message: Option<String>,
    /// `patch.branch=<name>`: the client branch the push comes from.
    pub branch: Option<String>,
    /// `patch.base=<oid>`: the commit the revision is computed against.
    pub base: Option<Oid>,
    /// `patch.draft`: open the patch as a draft.
    pub draft: bool,
    /// `patch.force`: accept a head that is not a fast-forward.
    pub force: bool,
}

impl Options {
    /// Parse push options. Options outside the `patch.` namespace are ignored.
    pub fn parse<I, T>(options: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut parsed = Self::default();

        for option in options {
            let option = option.as_ref();
            let (key, value) = match option.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (option, None),
            };
            match (key, value) {
                ("patch.message", Some(v)) => parsed.message = Some(v.replace("\\n", "\n")),
                ("patch.branch", Some(v)) if !v.is_empty() => parsed.branch = Some(v.to_owned()),
                ("patch.base", Some(v)) => {
                    parsed.base = Some(
                        v.parse()
                            .map_err(|_| Error::InvalidOption(option.to_owned()))?,
                    )
                }
                ("patch.draft", None) => parsed.draft = true,
                ("patch.force", None) => parsed.force = true,
                (key, _) if key.starts_with("patch.") => {
                    return Err(Error::InvalidOption(option.to_owned()))
                }
                _ => {}
            }
        }
        Ok(parsed)
    }
}

/// A single reference update received from a client.
#[derive(Debug, Clone)]
pub struct Push {
    pub refname: String,
    pub old: Oid,
    pub new: Oid,
    pub author: PublicKey,
    pub options: Options,
}

impl Push {
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }
}

/// What a push did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Opened(PatchId),
    Updated { id: PatchId, revision: RevisionIndex },
    NoOp(PatchId),
    Merged(Vec<PatchId>),
    Ignored,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened(id) => write!(f, "Patch {} opened", id),
            Self::Updated { id, revision } => {
                write!(f, "Patch {} updated to revision {}", id, revision)
            }
            Self::NoOp(id) => write!(f, "Patch {} is up to date", id),
            Self::Merged(ids) => {
                let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
                write!(f, "Patches merged: [{}]", ids.join(", "))
            }
            Self::Ignored => write!(f, "Nothing to do"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Association {
    patch: PatchId,
}

pub struct Translator<S> {
    patches: Patches<S>,
    default_branch: Option<String>,
}

impl<S: ObjectStore> Translator<S> {
    pub fn new(patches: Patches<S>, default_branch: Option<String>) -> Self {
        Self {
            patches,
            default_branch,
        }
    }

    pub fn patches(&self) -> &Patches<S> {
        &self.patches
    }

    /// Check a push without changing anything.
    pub fn validate(&self, push: &Push) -> Result<Target, Error> {
        let target = Target::classify(&push.refname)?;

        match &target {
            Target::Intake | Target::Patch(_) if push.is_delete() => {
                return Err(Error::Delete(push.refname.clone()))
            }
            Target::Object(..) => return Err(Error::ProtectedRef(push.refname.clone())),
            Target::Intake => {
                if let Some(id) = self.associated(push)? {
                    self.check_update(&id, push)?;
                }
            }
            Target::Patch(id) => self.check_update(id, push)?,
            Target::Branch(_) | Target::Other => {}
        }
        Ok(target)
    }

    /// Apply a push.
    pub fn handle(&self, push: &Push) -> Result<Outcome, Error> {
        let target = self.validate(push)?;

        let outcome = match target {
            Target::Intake => match self.associated(push)? {
                Some(id) => self.revise(&id, push)?,
                None => self.open(push)?,
            },
            Target::Patch(id) => self.revise(&id, push)?,
            Target::Branch(name)
                if !push.is_delete() && self.default_branch.as_deref() == Some(name.as_str()) =>
            {
                Outcome::Merged(self.patches.merged(push.new)?)
            }
            _ => Outcome::Ignored,
        };
        debug!(refname = %push.refname, new = %push.new, "Push handled: {}", outcome);

        Ok(outcome)
    }

    /// The patch opened from a client branch, if any.
    pub fn association(&self, author: &PublicKey, branch: &str) -> Result<Option<PatchId>, Error> {
        let record = object::load::<_, Association>(
            self.patches.store(),
            &intake_typename(),
            &association_id(author, branch)?,
        )?;
        Ok(record.map(|r| r.value.patch))
    }

    fn associated(&self, push: &Push) -> Result<Option<PatchId>, Error> {
        match &push.options.branch {
            Some(branch) => self.association(&push.author, branch),
            None => Ok(None),
        }
    }

    fn associate(&self, author: &PublicKey, branch: &str, id: &PatchId) -> Result<(), Error> {
        let name = association_id(author, branch)?;
        let previous = object::load::<_, Association>(self.patches.store(), &intake_typename(), &name)?
            .map(|r| r.version);

        object::save(
            self.patches.store(),
            &intake_typename(),
            &name,
            &Association { patch: *id },
            previous,
        )?;
        debug!(%id, %author, branch, "Branch associated with patch");

        Ok(())
    }

    fn check_update(&self, id: &PatchId, push: &Push) -> Result<(), Error> {
        let patch = self
            .patches
            .get(id)?
            .ok_or(crate::Error::PatchNotFound(*id))?;
        let current = patch.head();

        if push.new != current
            && !push.options.force
            && !self.patches.store().is_descendant(push.new, current)?
        {
            return Err(crate::Error::NonFastForward {
                head: push.new,
                current,
            }
            .into());
        }
        Ok(())
    }

    fn open(&self, push: &Push) -> Result<Outcome, Error> {
        let message = self.message(push)?;
        let (title, description) = match message.trim().split_once('\n') {
            Some((title, description)) => (title.trim(), description.trim()),
            None => (message.trim(), ""),
        };
        let base = match push.options.base {
            Some(base) => base,
            None => self.base(push.new)?,
        };
        let id = if push.options.draft {
            self.patches
                .draft(title, description, base, push.new, &push.author)?
        } else {
            self.patches
                .open(title, description, base, push.new, &push.author)?
        };

        if let Some(branch) = &push.options.branch {
            match self.associate(&push.author, branch, &id) {
                Ok(()) => {}
                // Another push opened a patch from this branch first. Ours stays
                // reachable through its canonical reference.
                Err(Error::Object(e)) if e.is_conflict() => {
                    warn!(%id, author = %push.author, %branch, "Branch already associated");
                }
                Err(e) => return Err(e),
            }
        }
        self.sync(&id)?;
        info!(%id, author = %push.author, "Patch opened from push");

        Ok(Outcome::Opened(id))
    }

    fn revise(&self, id: &PatchId, push: &Push) -> Result<Outcome, Error> {
        let message = self.message(push)?;
        let update = self.patches.update(
            id,
            push.new,
            push.options.base,
            message.trim(),
            push.options.force,
            &push.author,
        )?;
        self.sync(id)?;

        match update {
            Update::Revision(revision) => Ok(Outcome::Updated { id: *id, revision }),
            Update::NoOp => Ok(Outcome::NoOp(*id)),
        }
    }

    fn message(&self, push: &Push) -> Result<String, Error> {
        match &push.options.message {
            Some(message) => Ok(message.clone()),
            None => Ok(self.patches.store().commit_message(push.new)?),
        }
    }

    /// The base of a new patch: the default branch tip, or the head itself if there
    /// is no default branch.
    fn base(&self, head: Oid) -> Result<Oid, Error> {
        let tip = match &self.default_branch {
            Some(branch) => self.patches.store().reference(&refs::branch(branch))?,
            None => None,
        };
        Ok(tip.unwrap_or(head))
    }

    /// Point a pushed canonical reference back at the head recorded by its patch.
    ///
    /// Git moves the reference before the push is handled, so a push that failed to
    /// apply leaves it pointing at a commit no revision knows about. Other references,
    /// and references of unknown patches, are left alone.
    pub fn restore(&self, push: &Push) -> Result<(), Error> {
        match Target::classify(&push.refname) {
            Ok(Target::Patch(id)) if self.patches.get(&id)?.is_some() => {
                self.sync(&id)?;
                debug!(%id, "Canonical reference restored");

                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Point the canonical reference of a patch at its current head.
    fn sync(&self, id: &PatchId) -> Result<(), Error> {
        let name = refs::patch(id);
        let store = self.patches.store();

        loop {
            let head = self
                .patches
                .get(id)?
                .ok_or(crate::Error::PatchNotFound(*id))?
                .head();
            let current = store.reference(&name)?;

            if current == Some(head) {
                return Ok(());
            }
            match store.update_reference(&name, head, current) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Type name of the records associating client branches with patches.
pub fn intake_typename() -> TypeName {
    TypeName::new(INTAKE_TYPENAME)
}

/// Branch names nest, so they can't be used as reference names directly: `feature` and
/// `feature/x` would clash. Associations are keyed by a hash instead.
fn association_id(author: &PublicKey, branch: &str) -> Result<String, Error> {
    let key = object::encode(&(author, branch)).map_err(object::Error::from)?;
    let id = Oid::hash_blob(&key).map_err(store::Error::from)?;

    Ok(id.to_string())
}
