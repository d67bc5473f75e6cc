//! In-memory object store.
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Error, ObjectStore};
use crate::git::Oid;

#[derive(Debug, Clone)]
struct Commit {
    parents: Vec<Oid>,
    message: String,
}

#[derive(Debug, Default)]
struct Inner {
    commits: HashMap<Oid, Commit>,
    blobs: HashMap<Oid, Vec<u8>>,
    refs: BTreeMap<String, Oid>,
}

/// An object store kept entirely in memory. Commits only carry their parents and
/// a message, which is all the patch core looks at.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit with the given parents and return its id.
    pub fn commit(&self, message: &str, parents: &[Oid]) -> Oid {
        let mut inner = self.write();
        let mut body = format!("serial {}\n", inner.commits.len());
        for parent in parents {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push('\n');
        body.push_str(message);

        // Hashing in memory does not touch any repository and cannot fail.
        let oid = Oid::hash_blob(body.as_bytes()).expect("MemoryStore::commit: hashing failed");
        inner.commits.insert(
            oid,
            Commit {
                parents: parents.to_vec(),
                message: message.to_owned(),
            },
        );
        oid
    }

    /// Point a reference at a target, unconditionally.
    pub fn set_reference(&self, name: &str, target: Oid) {
        self.write().refs.insert(name.to_owned(), target);
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for MemoryStore {
    fn is_descendant(&self, commit: Oid, ancestor: Oid) -> Result<bool, Error> {
        let inner = self.read();
        let start = inner.commits.get(&commit).ok_or(Error::NotFound(commit))?;
        let mut queue = start.parents.iter().copied().collect::<VecDeque<_>>();
        let mut visited = HashSet::new();

        while let Some(oid) = queue.pop_front() {
            if oid == ancestor {
                return Ok(true);
            }
            if !visited.insert(oid) {
                continue;
            }
            if let Some(c) = inner.commits.get(&oid) {
                queue.extend(c.parents.iter().copied());
            }
        }
        Ok(false)
    }

    fn commit_message(&self, commit: Oid) -> Result<String, Error> {
        self.read()
            .commits
            .get(&commit)
            .map(|c| c.message.clone())
            .ok_or(Error::NotFound(commit))
    }

    fn reference(&self, name: &str) -> Result<Option<Oid>, Error> {
        Ok(self.read().refs.get(name).copied())
    }

    fn references(&self, prefix: &str) -> Result<Vec<(String, Oid)>, Error> {
        Ok(self
            .read()
            .refs
            .range(prefix.to_owned()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, oid)| (name.clone(), *oid))
            .collect())
    }

    fn update_reference(
        &self,
        name: &str,
        target: Oid,
        previous: Option<Oid>,
    ) -> Result<(), Error> {
        let mut inner = self.write();

        if inner.refs.get(name).copied() != previous {
            return Err(Error::Conflict(name.to_owned()));
        }
        inner.refs.insert(name.to_owned(), target);

        Ok(())
    }

    fn write_blob(&self, data: &[u8]) -> Result<Oid, Error> {
        let oid = Oid::hash_blob(data)?;
        self.write().blobs.insert(oid, data.to_vec());

        Ok(oid)
    }

    fn blob(&self, oid: Oid) -> Result<Vec<u8>, Error> {
        self.read().blobs.get(&oid).cloned().ok_or(Error::NotFound(oid))
    }
}
