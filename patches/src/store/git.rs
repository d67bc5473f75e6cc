//! Object store backed by a git repository.
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use git2::ErrorCode;

use super::{Error, ObjectStore};
use crate::git::Oid;

/// Message recorded in the reflog for every reference update.
const REFLOG_MESSAGE: &str = "radicle: update patch state";

pub struct GitStore {
    backend: Mutex<git2::Repository>,
    namespace: Option<String>,
}

impl GitStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let backend = git2::Repository::open(path)?;

        Ok(Self::from(backend))
    }

    /// Resolve all references relative to the given namespace.
    pub fn with_namespace(self, namespace: &str) -> Result<Self, Error> {
        self.repo().set_namespace(namespace)?;

        Ok(Self {
            namespace: Some(namespace.to_owned()),
            ..self
        })
    }

    /// Run a function against the underlying repository.
    pub fn with_repository<T>(&self, f: impl FnOnce(&git2::Repository) -> T) -> T {
        f(&self.repo())
    }

    fn repo(&self) -> MutexGuard<'_, git2::Repository> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn strip_namespace<'a>(&self, name: &'a str) -> &'a str {
        self.namespace
            .as_ref()
            .and_then(|ns| name.strip_prefix(&format!("refs/namespaces/{}/", ns)))
            .unwrap_or(name)
    }
}

impl From<git2::Repository> for GitStore {
    fn from(backend: git2::Repository) -> Self {
        Self {
            backend: Mutex::new(backend),
            namespace: None,
        }
    }
}

fn not_found(oid: Oid) -> impl FnOnce(git2::Error) -> Error {
    move |e| {
        if e.code() == ErrorCode::NotFound {
            Error::NotFound(oid)
        } else {
            Error::Git(e)
        }
    }
}

impl ObjectStore for GitStore {
    fn is_descendant(&self, commit: Oid, ancestor: Oid) -> Result<bool, Error> {
        let repo = self.repo();
        repo.find_commit(*commit).map_err(not_found(commit))?;

        if repo.find_commit(*ancestor).is_err() {
            return Ok(false);
        }
        Ok(repo.graph_descendant_of(*commit, *ancestor)?)
    }

    fn commit_message(&self, commit: Oid) -> Result<String, Error> {
        let repo = self.repo();
        let c = repo.find_commit(*commit).map_err(not_found(commit))?;

        Ok(c.message().unwrap_or_default().to_owned())
    }

    fn reference(&self, name: &str) -> Result<Option<Oid>, Error> {
        let repo = self.repo();
        let result = match repo.find_reference(name) {
            Ok(r) => r.target().map(Oid::from),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(result)
    }

    fn references(&self, prefix: &str) -> Result<Vec<(String, Oid)>, Error> {
        let repo = self.repo();
        let mut refs = Vec::new();

        for r in repo.references()? {
            let r = r?;
            let (name, target) = match (r.name(), r.target()) {
                (Some(name), Some(target)) => (self.strip_namespace(name), target),
                _ => continue,
            };
            if name.starts_with(prefix) {
                refs.push((name.to_owned(), Oid::from(target)));
            }
        }
        refs.sort();

        Ok(refs)
    }

    fn update_reference(
        &self,
        name: &str,
        target: Oid,
        previous: Option<Oid>,
    ) -> Result<(), Error> {
        let repo = self.repo();
        let result = match previous {
            None => repo.reference(name, *target, false, REFLOG_MESSAGE),
            Some(prev) => repo.reference_matching(name, *target, true, *prev, REFLOG_MESSAGE),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::Exists | ErrorCode::Modified | ErrorCode::NotFound
                ) =>
            {
                Err(Error::Conflict(name.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_blob(&self, data: &[u8]) -> Result<Oid, Error> {
        Ok(self.repo().blob(data)?.into())
    }

    fn blob(&self, oid: Oid) -> Result<Vec<u8>, Error> {
        let repo = self.repo();
        let blob = repo.find_blob(*oid).map_err(not_found(oid))?;

        Ok(blob.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(repo: &git2::Repository, message: &str, parents: &[Oid]) -> Oid {
        let sig = git2::Signature::now("anonymous", "anonymous@radicle.xyz").unwrap();
        let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents = parents
            .iter()
            .map(|p| repo.find_commit(**p).unwrap())
            .collect::<Vec<_>>();
        let parents = parents.iter().collect::<Vec<_>>();

        repo.commit(None, &sig, &sig, message, &tree, &parents)
            .unwrap()
            .into()
    }

    #[test]
    fn test_git_store() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(tmp.path()).unwrap();
        let store = GitStore::from(repo);
        let (a, b, c) = store.with_repository(|repo| {
            let a = commit(repo, "a", &[]);
            let b = commit(repo, "b\n\nbody", &[a]);
            let c = commit(repo, "c", &[a]);
            (a, b, c)
        });

        assert!(store.is_descendant(b, a).unwrap());
        assert!(!store.is_descendant(a, a).unwrap());
        assert!(!store.is_descendant(c, b).unwrap());
        assert_eq!(store.commit_message(b).unwrap(), "b\n\nbody");

        store.update_reference("refs/heads/master", a, None).unwrap();
        assert!(store
            .update_reference("refs/heads/master", b, None)
            .unwrap_err()
            .is_conflict());
        assert!(store
            .update_reference("refs/heads/master", b, Some(c))
            .unwrap_err()
            .is_conflict());
        store
            .update_reference("refs/heads/master", b, Some(a))
            .unwrap();
        assert_eq!(store.reference("refs/heads/master").unwrap(), Some(b));
        assert_eq!(store.reference("refs/heads/missing").unwrap(), None);

        let blob = store.write_blob(b"{}").unwrap();
        assert_eq!(blob, Oid::hash_blob(b"{}").unwrap());
        assert_eq!(store.blob(blob).unwrap(), b"{}".to_vec());
        assert_eq!(
            store.references("refs/heads/").unwrap(),
            vec![(String::from("refs/heads/master"), b)]
        );
    }
}
