//! Git object ids and the reference layout used for patches.
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A git object id, serialized as a hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(git2::Oid);

impl Oid {
    /// Hash bytes the way git hashes a blob.
    pub fn hash_blob(data: &[u8]) -> Result<Self, git2::Error> {
        git2::Oid::hash_object(git2::ObjectType::Blob, data).map(Self)
    }

    /// Whether this is the all-zero id git uses for "no object".
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<git2::Oid> for Oid {
    fn from(oid: git2::Oid) -> Self {
        Self(oid)
    }
}

impl From<Oid> for git2::Oid {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl Deref for Oid {
    type Target = git2::Oid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl FromStr for Oid {
    type Err = git2::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        git2::Oid::from_str(s).map(Self)
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Reference names.
///
/// Three address classes exist:
///
/// * `refs/patches` is the intake reference. A push here opens or updates a patch.
/// * `refs/heads/patches/<id>` holds the current revision head of a patch.
/// * `refs/cobs/<type>/<id>` holds the serialized state of a collaborative object.
pub mod refs {
    use crate::object::{ObjectId, TypeName};

    /// The intake reference.
    pub const PATCHES: &str = "refs/patches";
    /// Prefix of the canonical per-patch references.
    pub const PATCH_HEADS: &str = "refs/heads/patches/";
    /// Prefix of collaborative object references.
    pub const COBS: &str = "refs/cobs/";
    /// Prefix of branch references.
    pub const HEADS: &str = "refs/heads/";

    /// Canonical reference of a patch, eg. `refs/heads/patches/<id>`.
    pub fn patch(id: &ObjectId) -> String {
        format!("{}{}", PATCH_HEADS, id)
    }

    /// Metadata reference of an object, eg. `refs/cobs/xyz.radicle.patch/<id>`.
    pub fn cob(typename: &TypeName, id: &str) -> String {
        format!("{}{}/{}", COBS, typename, id)
    }

    /// Branch reference, eg. `refs/heads/master`.
    pub fn branch(name: &str) -> String {
        format!("{}{}", HEADS, name)
    }
}
