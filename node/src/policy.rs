//! Seeding and follow policies.
//!
//! A repository is only replicated or listed in the inventory once it has a seeding
//! policy. Its scope decides whose content is replicated: everyone's, or only that
//! of followed nodes.
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::{fmt, io};

use crossbeam_channel as chan;
use serde::{Deserialize, Serialize};
use shared::{NodeId, RepoId};

pub mod store;

pub use store::Store;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("policy store: {0}")]
    Store(#[from] io::Error),
}

/// Whose content is replicated for a seeded repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    /// Content from any node.
    All,
    /// Content from followed nodes only.
    Followed,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Followed => write!(f, "followed"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "followed" => Ok(Self::Followed),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedingPolicy {
    pub rid: RepoId,
    pub scope: Scope,
    /// Whether to fetch the repository, or only advertise it.
    pub fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowPolicy {
    pub nid: NodeId,
    pub alias: Option<String>,
}

/// Repository visibility. Has no bearing on replication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// A policy change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Seeded(SeedingPolicy),
    Unseeded(RepoId),
    Followed(FollowPolicy),
    Unfollowed(NodeId),
}

/// The policy engine.
///
/// Mutations are serialized by a single writer lock and flushed to the store before
/// the lock is released, so a decision made after a mutation returns always sees it.
#[derive(Debug)]
pub struct Policies {
    store: RwLock<Store>,
    repos: RwLock<HashMap<RepoId, Visibility>>,
    subscribers: Mutex<Vec<chan::Sender<Event>>>,
}

impl Policies {
    /// Load policies from a file, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let store = if path.exists() {
            Store::open(path)?
        } else {
            Store::create(path)?
        };
        log::info!(
            "Loaded {} seeding and {} follow policies from {}",
            store.tables.seeding.len(),
            store.tables.follow.len(),
            path.display()
        );

        Ok(Self::from(store))
    }

    /// Policies that are kept in memory only.
    pub fn memory() -> Self {
        Self::from(Store::memory())
    }

    /// Seed a repository, or change how it is seeded.
    ///
    /// Returns `false` if the policy was already in place.
    pub fn set_seeding(&self, rid: &RepoId, scope: Scope, fetch: bool) -> Result<bool, Error> {
        let entry = store::Seeding { scope, fetch };
        let updated = self.update(|tables| tables.seeding.insert(*rid, entry) != Some(entry))?;

        if updated {
            log::info!("Seeding {} (scope={}, fetch={})", rid, scope, fetch);
            self.emit(Event::Seeded(SeedingPolicy {
                rid: *rid,
                scope,
                fetch,
            }));
        }
        Ok(updated)
    }

    /// Stop seeding a repository. Returns `false` if it wasn't seeded.
    pub fn remove_seeding(&self, rid: &RepoId) -> Result<bool, Error> {
        let removed = self.update(|tables| tables.seeding.remove(rid).is_some())?;

        if removed {
            log::info!("Stopped seeding {}", rid);
            self.emit(Event::Unseeded(*rid));
        }
        Ok(removed)
    }

    pub fn seeding(&self, rid: &RepoId) -> Option<SeedingPolicy> {
        self.read()
            .tables
            .seeding
            .get(rid)
            .map(|s| SeedingPolicy {
                rid: *rid,
                scope: s.scope,
                fetch: s.fetch,
            })
    }

    /// All seeding policies, ordered by repository.
    pub fn seeding_policies(&self) -> Vec<SeedingPolicy> {
        self.read()
            .tables
            .seeding
            .iter()
            .map(|(rid, s)| SeedingPolicy {
                rid: *rid,
                scope: s.scope,
                fetch: s.fetch,
            })
            .collect()
    }

    /// Follow a node, or change its alias.
    ///
    /// Returns `false` if the node was already followed under the same alias.
    pub fn set_follow(&self, nid: &NodeId, alias: Option<String>) -> Result<bool, Error> {
        let entry = store::Follow {
            alias: alias.clone(),
        };
        let updated = self.update(|tables| {
            tables.follow.insert(*nid, entry.clone()).as_ref() != Some(&entry)
        })?;

        if updated {
            log::info!("Following {}", nid);
            self.emit(Event::Followed(FollowPolicy { nid: *nid, alias }));
        }
        Ok(updated)
    }

    /// Stop following a node. Content of the node that was already replicated is kept.
    pub fn unfollow(&self, nid: &NodeId) -> Result<bool, Error> {
        let removed = self.update(|tables| tables.follow.remove(nid).is_some())?;

        if removed {
            log::info!("Unfollowed {}", nid);
            self.emit(Event::Unfollowed(*nid));
        }
        Ok(removed)
    }

    pub fn is_following(&self, nid: &NodeId) -> bool {
        self.read().tables.follow.contains_key(nid)
    }

    pub fn alias(&self, nid: &NodeId) -> Option<String> {
        self.read()
            .tables
            .follow
            .get(nid)
            .and_then(|f| f.alias.clone())
    }

    /// All followed nodes, ordered by id.
    pub fn follows(&self) -> Vec<FollowPolicy> {
        self.read()
            .tables
            .follow
            .iter()
            .map(|(nid, f)| FollowPolicy {
                nid: *nid,
                alias: f.alias.clone(),
            })
            .collect()
    }

    /// Whether content of `author` in repository `rid` should be replicated.
    pub fn should_replicate(&self, rid: &RepoId, author: &NodeId) -> bool {
        let state = self.read();

        match state.tables.seeding.get(rid) {
            None => false,
            Some(store::Seeding {
                scope: Scope::All, ..
            }) => true,
            Some(store::Seeding {
                scope: Scope::Followed,
                ..
            }) => state.tables.follow.contains_key(author),
        }
    }

    /// The repositories this node makes available: exactly the seeded ones.
    pub fn list_inventory(&self) -> BTreeSet<RepoId> {
        self.read().tables.seeding.keys().copied().collect()
    }

    /// Record a local repository and its visibility. This never seeds it.
    pub fn register(&self, rid: &RepoId, visibility: Visibility) {
        self.repos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*rid, visibility);

        log::debug!("Registered {} as {:?}", rid, visibility);
    }

    pub fn visibility(&self, rid: &RepoId) -> Option<Visibility> {
        self.repos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(rid)
            .copied()
    }

    /// Receive every policy change made from now on.
    pub fn subscribe(&self) -> chan::Receiver<Event> {
        let (sender, receiver) = chan::unbounded();

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);

        receiver
    }

    /// Write the tables to the store.
    pub fn flush(&self) -> Result<(), Error> {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .write()?;

        Ok(())
    }

    /// Flush the tables and disconnect subscribers.
    pub fn shutdown(self) -> Result<(), Error> {
        self.flush()?;
        log::info!("Policy engine shut down");

        Ok(())
    }

    /// Apply a change to a copy of the tables, and swap it in once it is stored.
    fn update<T>(&self, f: impl FnOnce(&mut store::Tables) -> T) -> Result<T, Error> {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let mut tables = store.tables.clone();
        let result = f(&mut tables);

        if tables == store.tables {
            return Ok(result);
        }
        let previous = std::mem::replace(&mut store.tables, tables);
        if let Err(e) = store.write() {
            store.tables = previous;
            return Err(e.into());
        }
        Ok(result)
    }

    fn emit(&self, event: Event) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.send(event.clone()).is_ok());
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Store> for Policies {
    fn from(store: Store) -> Self {
        Self {
            store: RwLock::new(store),
            repos: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::test::arbitrary;

    #[test]
    fn test_default_deny() {
        let policies = Policies::memory();
        let rid = arbitrary::gen::<RepoId>(1);
        let author = arbitrary::gen::<NodeId>(1);

        policies.register(&rid, Visibility::Public);
        assert!(!policies.should_replicate(&rid, &author));
        assert!(policies.seeding(&rid).is_none());
        assert!(policies.list_inventory().is_empty());
    }

    #[test]
    fn test_scopes() {
        let policies = Policies::memory();
        let rid = arbitrary::gen::<RepoId>(1);
        let alice = arbitrary::gen::<NodeId>(1);
        let bob = arbitrary::gen::<NodeId>(1);

        assert!(policies.set_seeding(&rid, Scope::All, true).unwrap());
        assert!(!policies.set_seeding(&rid, Scope::All, true).unwrap());
        assert!(policies.should_replicate(&rid, &alice));
        assert!(policies.should_replicate(&rid, &bob));

        policies.set_follow(&alice, None).unwrap();
        policies.set_seeding(&rid, Scope::Followed, true).unwrap();
        assert!(policies.should_replicate(&rid, &alice));
        assert!(!policies.should_replicate(&rid, &bob));

        policies.unfollow(&alice).unwrap();
        assert!(!policies.should_replicate(&rid, &alice));

        assert!(policies.remove_seeding(&rid).unwrap());
        assert!(!policies.remove_seeding(&rid).unwrap());
        policies.set_follow(&alice, None).unwrap();
        assert!(!policies.should_replicate(&rid, &alice));
    }

    #[quickcheck]
    fn prop_should_replicate(rid: RepoId, author: NodeId, seed: Option<bool>, follow: bool) {
        let policies = Policies::memory();

        if let Some(all) = seed {
            let scope = if all { Scope::All } else { Scope::Followed };
            policies.set_seeding(&rid, scope, false).unwrap();
        }
        if follow {
            policies.set_follow(&author, None).unwrap();
        }
        let expected = match seed {
            None => false,
            Some(true) => true,
            Some(false) => follow,
        };
        assert_eq!(policies.should_replicate(&rid, &author), expected);
    }

    #[test]
    fn test_inventory_ignores_visibility() {
        let policies = Policies::memory();
        let public = arbitrary::gen::<RepoId>(1);
        let private = arbitrary::gen::<RepoId>(1);
        let unseeded = arbitrary::gen::<RepoId>(1);

        policies.register(&public, Visibility::Public);
        policies.register(&private, Visibility::Private);
        policies.register(&unseeded, Visibility::Public);
        policies.set_seeding(&public, Scope::All, true).unwrap();
        policies.set_seeding(&private, Scope::Followed, false).unwrap();

        assert_eq!(
            policies.list_inventory(),
            BTreeSet::from([public, private])
        );
        assert_eq!(policies.visibility(&private), Some(Visibility::Private));

        policies.remove_seeding(&private).unwrap();
        assert_eq!(policies.list_inventory(), BTreeSet::from([public]));
    }

    #[test]
    fn test_aliases() {
        let policies = Policies::memory();
        let alice = arbitrary::gen::<NodeId>(1);
        let bob = arbitrary::gen::<NodeId>(1);

        policies
            .set_follow(&alice, Some(String::from("alice")))
            .unwrap();
        policies.set_follow(&bob, None).unwrap();
        assert!(!policies
            .set_follow(&alice, Some(String::from("alice")))
            .unwrap());
        assert!(policies
            .set_follow(&alice, Some(String::from("alicia")))
            .unwrap());

        assert!(policies.is_following(&bob));
        assert_eq!(policies.alias(&alice).as_deref(), Some("alicia"));
        assert_eq!(policies.alias(&bob), None);
        assert_eq!(policies.follows().len(), 2);
    }

    #[test]
    fn test_events() {
        let policies = Policies::memory();
        let events = policies.subscribe();
        let rid = arbitrary::gen::<RepoId>(1);
        let nid = arbitrary::gen::<NodeId>(1);

        policies.set_seeding(&rid, Scope::All, true).unwrap();
        policies.set_seeding(&rid, Scope::All, true).unwrap();
        policies.set_follow(&nid, None).unwrap();
        policies.unfollow(&nid).unwrap();
        policies.remove_seeding(&rid).unwrap();

        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                Event::Seeded(SeedingPolicy {
                    rid,
                    scope: Scope::All,
                    fetch: true
                }),
                Event::Followed(FollowPolicy { nid, alias: None }),
                Event::Unfollowed(nid),
                Event::Unseeded(rid),
            ]
        );

        // Dropped subscribers are forgotten.
        drop(events);
        policies.unfollow(&nid).unwrap();
        policies.set_follow(&nid, None).unwrap();
        assert!(policies.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("policies.json");
        let rid = arbitrary::gen::<RepoId>(1);
        let nid = arbitrary::gen::<NodeId>(1);

        let policies = Policies::open(&path).unwrap();
        policies.set_seeding(&rid, Scope::Followed, true).unwrap();
        policies.set_follow(&nid, Some(String::from("bob"))).unwrap();
        policies.shutdown().unwrap();

        let policies = Policies::open(&path).unwrap();
        assert_eq!(
            policies.seeding(&rid),
            Some(SeedingPolicy {
                rid,
                scope: Scope::Followed,
                fetch: true
            })
        );
        assert_eq!(policies.alias(&nid).as_deref(), Some("bob"));
        assert!(policies.should_replicate(&rid, &nid));
    }
}
