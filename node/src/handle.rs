//! Handle used by the control socket to change node policies.
use std::sync::Arc;

use shared::{NodeId, RepoId};

use crate::policy::{self, Policies, Scope, Visibility};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Policy(#[from] policy::Error),
}

pub mod traits {
    use super::*;

    /// Policy commands accepted by a running node.
    pub trait PolicyAPI {
        fn seed(&self, rid: RepoId, scope: Scope, fetch: bool) -> Result<(), Error>;
        fn unseed(&self, rid: RepoId) -> Result<(), Error>;
        fn follow(&self, nid: NodeId, alias: Option<String>) -> Result<(), Error>;
        fn unfollow(&self, nid: NodeId) -> Result<(), Error>;
        fn register(&self, rid: RepoId, visibility: Visibility) -> Result<(), Error>;
        fn shutdown(self) -> Result<(), Error>;
    }
}

/// Handle to the node's policy engine.
#[derive(Debug, Clone)]
pub struct Handle {
    policies: Arc<Policies>,
}

impl Handle {
    pub fn new(policies: Arc<Policies>) -> Self {
        Self { policies }
    }
}

impl traits::PolicyAPI for Handle {
    fn seed(&self, rid: RepoId, scope: Scope, fetch: bool) -> Result<(), Error> {
        self.policies.set_seeding(&rid, scope, fetch)?;
        Ok(())
    }

    fn unseed(&self, rid: RepoId) -> Result<(), Error> {
        self.policies.remove_seeding(&rid)?;
        Ok(())
    }

    fn follow(&self, nid: NodeId, alias: Option<String>) -> Result<(), Error> {
        self.policies.set_follow(&nid, alias)?;
        Ok(())
    }

    fn unfollow(&self, nid: NodeId) -> Result<(), Error> {
        self.policies.unfollow(&nid)?;
        Ok(())
    }

    fn register(&self, rid: RepoId, visibility: Visibility) -> Result<(), Error> {
        self.policies.register(&rid, visibility);
        Ok(())
    }

    fn shutdown(self) -> Result<(), Error> {
        self.policies.flush()?;
        Ok(())
    }
}
