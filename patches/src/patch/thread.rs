//! Comments and the reply tree derived from them.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared::PublicKey;

use super::{PatchId, RevisionIndex};
use crate::git::Oid;
use crate::object::{self, ObjectId, Timestamp};

/// Comments are identified by a hash of their content and position.
pub type CommentId = ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub author: PublicKey,
    pub body: String,
    /// The comment this one replies to, in the same revision.
    pub reply_to: Option<CommentId>,
    pub timestamp: Timestamp,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Seed<'a> {
    patch: &'a PatchId,
    revision: RevisionIndex,
    position: usize,
    author: &'a PublicKey,
    body: &'a str,
    reply_to: Option<&'a CommentId>,
    timestamp: Timestamp,
}

impl Comment {
    /// Create the comment at `position` in the log of a revision.
    pub(crate) fn new(
        patch: &PatchId,
        revision: RevisionIndex,
        position: usize,
        author: PublicKey,
        body: String,
        reply_to: Option<CommentId>,
        timestamp: Timestamp,
    ) -> Result<Self, object::Error> {
        let seed = Seed {
            patch,
            revision,
            position,
            author: &author,
            body: &body,
            reply_to: reply_to.as_ref(),
            timestamp,
        };
        let id = Oid::hash_blob(&object::encode(&seed)?).map_err(crate::store::Error::from)?;

        Ok(Self {
            id,
            author,
            body,
            reply_to,
            timestamp,
        })
    }
}

/// A comment together with its replies, in the order they were made.
#[derive(Debug, PartialEq, Eq)]
pub struct Thread<'a> {
    pub comment: &'a Comment,
    pub replies: Vec<Thread<'a>>,
}

impl<'a> Thread<'a> {
    /// Number of comments in this thread, including the root.
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(Thread::len).sum::<usize>()
    }
}

/// Build the reply trees of a flat comment log.
pub fn threads(comments: &[Comment]) -> Vec<Thread<'_>> {
    let mut children: HashMap<CommentId, Vec<&Comment>> = HashMap::new();
    let mut roots = Vec::new();

    for comment in comments {
        match comment.reply_to {
            Some(parent) => children.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }
    roots.into_iter().map(|c| build(c, &children)).collect()
}

fn build<'a>(comment: &'a Comment, children: &HashMap<CommentId, Vec<&'a Comment>>) -> Thread<'a> {
    let replies = children
        .get(&comment.id)
        .map(|cs| cs.iter().map(|c| build(c, children)).collect())
        .unwrap_or_default();

    Thread { comment, replies }
}
