use std::sync::{Arc, Mutex};

use shared::{NodeId, RepoId};

use crate::handle::{traits, Error};
use crate::policy::{Scope, Visibility};

/// A command received by the test handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Seed(RepoId, Scope, bool),
    Unseed(RepoId),
    Follow(NodeId, Option<String>),
    Unfollow(NodeId),
    Register(RepoId, Visibility),
}

#[derive(Default, Clone)]
pub struct Handle {
    pub commands: Arc<Mutex<Vec<Command>>>,
}

impl traits::PolicyAPI for Handle {
    fn seed(&self, rid: RepoId, scope: Scope, fetch: bool) -> Result<(), Error> {
        self.commands
            .lock()
            .unwrap()
            .push(Command::Seed(rid, scope, fetch));

        Ok(())
    }

    fn unseed(&self, rid: RepoId) -> Result<(), Error> {
        self.commands.lock().unwrap().push(Command::Unseed(rid));

        Ok(())
    }

    fn follow(&self, nid: NodeId, alias: Option<String>) -> Result<(), Error> {
        self.commands
            .lock()
            .unwrap()
            .push(Command::Follow(nid, alias));

        Ok(())
    }

    fn unfollow(&self, nid: NodeId) -> Result<(), Error> {
        self.commands.lock().unwrap().push(Command::Unfollow(nid));

        Ok(())
    }

    fn register(&self, rid: RepoId, visibility: Visibility) -> Result<(), Error> {
        self.commands
            .lock()
            .unwrap()
            .push(Command::Register(rid, visibility));

        Ok(())
    }

    fn shutdown(self) -> Result<(), Error> {
        Ok(())
    }
}
