//! Collaborative objects: typed, versioned records stored next to git content.
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::{refs, Oid};
use crate::store::{self, ObjectStore};

/// Objects are identified by the hash of their initial content.
pub type ObjectId = Oid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
}

impl Error {
    /// Whether the underlying store rejected a write because the object moved.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

/// The type of a collaborative object, eg. `xyz.radicle.patch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

/// An object value along with the blob it was read from.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: Oid,
    pub value: T,
}

/// Encode a value as canonical JSON, so that equal values always hash to the same id.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, olpc_cjson::CanonicalFormatter::new());
    value.serialize(&mut serializer)?;

    Ok(buf)
}

/// Read an object by type and id.
pub fn load<S, T>(store: &S, typename: &TypeName, id: &str) -> Result<Option<Versioned<T>>, Error>
where
    S: ObjectStore + ?Sized,
    T: DeserializeOwned,
{
    let version = match store.reference(&refs::cob(typename, id))? {
        Some(oid) => oid,
        None => return Ok(None),
    };
    let bytes = store.blob(version)?;
    let value = serde_json::from_slice(&bytes)?;

    Ok(Some(Versioned { version, value }))
}

/// Write an object. `previous` must match the version currently stored, or be `None`
/// if the object does not exist yet; otherwise the write is rejected as a conflict.
pub fn save<S, T>(
    store: &S,
    typename: &TypeName,
    id: &str,
    value: &T,
    previous: Option<Oid>,
) -> Result<Oid, Error>
where
    S: ObjectStore + ?Sized,
    T: Serialize,
{
    let bytes = encode(value)?;
    let version = store.write_blob(&bytes)?;

    store.update_reference(&refs::cob(typename, id), version, previous)?;

    Ok(version)
}

/// List the ids of all objects of a type.
pub fn ids<S>(store: &S, typename: &TypeName) -> Result<Vec<String>, Error>
where
    S: ObjectStore + ?Sized,
{
    let prefix = refs::cob(typename, "");
    let ids = store
        .references(&prefix)?
        .into_iter()
        .filter_map(|(name, _)| name.strip_prefix(&prefix).map(ToOwned::to_owned))
        .collect();

    Ok(ids)
}
