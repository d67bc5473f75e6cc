//! Patches: proposed change sets tracked as an append-only sequence of revisions.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use shared::PublicKey;

use crate::error::Error;
use crate::git::Oid;
use crate::object::{ObjectId, Timestamp, TypeName};

pub mod review;
pub mod store;
pub mod thread;

pub use review::{Review, Verdict, VerdictPolicy};
pub use store::{Counts, Patches, Update};
pub use thread::{Comment, CommentId, Thread};

/// Type name of patch objects.
pub const TYPENAME: &str = "xyz.radicle.patch";

pub type PatchId = ObjectId;
pub type RevisionIndex = usize;

/// Type name of patch objects.
pub fn typename() -> TypeName {
    TypeName::new(TYPENAME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Draft,
    Open,
    Archived,
    Merged,
}

impl Status {
    /// Check that the patch may move from this status to `to`.
    ///
    /// Merged is only reachable from Open, and is never left.
    pub fn transition(self, to: Status) -> Result<Status, Error> {
        match (self, to) {
            (Self::Open, Self::Archived)
            | (Self::Archived, Self::Open)
            | (Self::Open, Self::Merged)
            | (Self::Draft, Self::Open) => Ok(to),
            (from, to) => Err(Error::InvalidStatusTransition { from, to }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Open => write!(f, "open"),
            Self::Archived => write!(f, "archived"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label '{0}' contains whitespace")]
    Whitespace(String),
}

/// A patch label, eg. `bug`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Label {
    type Error = LabelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(LabelError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(LabelError::Whitespace(s));
        }
        Ok(Self(s))
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

/// The metadata field changed by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Description,
}

/// An entry of the edit log. Edits never create revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub author: PublicKey,
    pub timestamp: Timestamp,
    pub field: Field,
    pub body: String,
}

/// One snapshot of a patch's head, with the reviews and comments made on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    index: RevisionIndex,
    author: PublicKey,
    head: Oid,
    base: Oid,
    message: String,
    timestamp: Timestamp,
    /// Whether the head was not a fast-forward of the previous revision's head.
    forced: bool,
    reviews: BTreeMap<PublicKey, Review>,
    comments: Vec<Comment>,
}

impl Revision {
    fn new(
        index: RevisionIndex,
        author: PublicKey,
        head: Oid,
        base: Oid,
        message: String,
        timestamp: Timestamp,
        forced: bool,
    ) -> Self {
        Self {
            index,
            author,
            head,
            base,
            message,
            timestamp,
            forced,
            reviews: BTreeMap::new(),
            comments: Vec::new(),
        }
    }

    pub fn index(&self) -> RevisionIndex {
        self.index
    }

    pub fn author(&self) -> &PublicKey {
        &self.author
    }

    pub fn head(&self) -> Oid {
        self.head
    }

    pub fn base(&self) -> Oid {
        self.base
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub fn reviews(&self) -> impl Iterator<Item = (&PublicKey, &Review)> {
        self.reviews.iter()
    }

    pub fn review(&self, reviewer: &PublicKey) -> Option<&Review> {
        self.reviews.get(reviewer)
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    /// The comments of this revision, arranged as reply trees.
    pub fn thread(&self) -> Vec<Thread<'_>> {
        thread::threads(&self.comments)
    }

    /// A reviewer has at most one review per revision; the latest one wins.
    fn set_review(&mut self, reviewer: PublicKey, review: Review) {
        self.reviews.insert(reviewer, review);
    }

    fn push_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    author: PublicKey,
    title: String,
    description: String,
    edits: Vec<Edit>,
    labels: BTreeSet<Label>,
    assignees: BTreeSet<PublicKey>,
    status: Status,
    revisions: NonEmpty<Revision>,
    timestamp: Timestamp,
}

impl Patch {
    fn new(
        author: PublicKey,
        title: String,
        description: String,
        status: Status,
        head: Oid,
        base: Oid,
        timestamp: Timestamp,
    ) -> Self {
        let initial = Revision::new(0, author, head, base, description.clone(), timestamp, false);

        Self {
            author,
            title,
            description,
            edits: Vec::new(),
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            status,
            revisions: NonEmpty::new(initial),
            timestamp,
        }
    }

    pub fn author(&self) -> &PublicKey {
        &self.author
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Title and description edits, oldest first.
    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn assignees(&self) -> impl Iterator<Item = &PublicKey> {
        self.assignees.iter()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Head of the latest revision.
    pub fn head(&self) -> Oid {
        self.latest().head
    }

    pub fn latest(&self) -> &Revision {
        self.revisions.last()
    }

    pub fn revision(&self, index: RevisionIndex) -> Option<&Revision> {
        self.revisions.get(index)
    }

    pub fn revisions(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter()
    }

    fn revision_mut(&mut self, index: RevisionIndex) -> Option<&mut Revision> {
        self.revisions.get_mut(index)
    }

    /// Append a revision and return its index.
    fn revise(
        &mut self,
        author: PublicKey,
        head: Oid,
        base: Oid,
        message: String,
        forced: bool,
        timestamp: Timestamp,
    ) -> RevisionIndex {
        let index = self.revisions.len();
        self.revisions
            .push(Revision::new(index, author, head, base, message, timestamp, forced));

        index
    }

    fn edit(&mut self, author: PublicKey, field: Field, body: String, timestamp: Timestamp) {
        match field {
            Field::Title => self.title = body.clone(),
            Field::Description => self.description = body.clone(),
        }
        self.edits.push(Edit {
            author,
            timestamp,
            field,
            body,
        });
    }
}
