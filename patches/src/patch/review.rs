//! Review verdicts and their aggregation across revisions.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shared::PublicKey;

use super::Patch;
use crate::object::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Accept,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// A review of a single revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub verdict: Verdict,
    /// Free-form summary of the review.
    pub summary: Option<String>,
    pub timestamp: Timestamp,
}

impl Review {
    pub fn new(verdict: Verdict, summary: Option<String>, timestamp: Timestamp) -> Self {
        Self {
            verdict,
            summary,
            timestamp,
        }
    }
}

/// Decides what happens to verdicts when a new revision is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerdictPolicy {
    /// Only verdicts given on the latest revision count.
    #[default]
    Reset,
    /// Verdicts on earlier revisions count until the reviewer gives a newer one.
    CarryForward,
}

impl VerdictPolicy {
    /// The effective verdict of every reviewer on the latest revision of a patch.
    ///
    /// This is always derived from the revisions, never stored.
    pub fn verdicts(&self, patch: &Patch) -> BTreeMap<PublicKey, Verdict> {
        match self {
            Self::Reset => patch
                .latest()
                .reviews()
                .map(|(reviewer, review)| (*reviewer, review.verdict))
                .collect(),
            Self::CarryForward => {
                let mut verdicts = BTreeMap::new();
                for revision in patch.revisions() {
                    for (reviewer, review) in revision.reviews() {
                        verdicts.insert(*reviewer, review.verdict);
                    }
                }
                verdicts
            }
        }
    }
}
