//! # PRE-RECEIVE HOOK
//!
//! Before any ref is updated, if $GIT_DIR/hooks/pre-receive file exists and is executable,
//! it will be invoked once with no parameters.
//!
//! The standard input of the hook will be one line per ref to be updated:
//!
//! `sha1-old SP sha1-new SP refname LF`
//!
//! # Use by Radicle Git-Server
//!
//! The `pre-receive` hook rejects the whole push if any update would be refused by the
//! patch translator: writes to object references, deletions of patch references, and
//! non-fast-forward updates of patches without the `patch.force` option.
use std::io::stdin;

use envconfig::Envconfig;
use radicle_patches::{ObjectStore, Translator};

use super::storage;
use super::types::{ReceivePackEnv, RefUpdate};
use crate::error::Error;

/// `PreReceive` provides access to the standard input values passed into the `pre-receive`
/// git hook, as well as parses environmental variables that may be used to process the hook.
#[derive(Debug, Clone)]
pub struct PreReceive {
    /// Environmental Variables.
    pub env: ReceivePackEnv,
    /// Ref updates.
    pub updates: Vec<RefUpdate>,
}

impl PreReceive {
    /// Instantiate from standard input.
    pub fn from_stdin() -> Result<Self, Error> {
        let env = ReceivePackEnv::init_from_env()?;
        let updates = super::read_updates(stdin().lock())?;

        Ok(Self { env, updates })
    }

    /// The main process used by `pre-receive` hook log
    pub fn hook() -> Result<(), Error> {
        eprintln!("Running pre-receive hook...");

        let pre_receive = Self::from_stdin()?;
        shared::init_logger(pre_receive.env.log_format);

        let store = storage::open(&pre_receive.env)?;
        let translator = storage::translator(store, &pre_receive.env);

        pre_receive.validate(&translator)
    }

    /// Check every update against the translator, without changing anything.
    pub fn validate<S: ObjectStore>(&self, translator: &Translator<S>) -> Result<(), Error> {
        for push in super::pushes(&self.env, &self.updates)? {
            if let Err(e) = translator.validate(&push) {
                eprintln!("Rejecting update to {}: {}", push.refname, e);
                tracing::warn!(refname = %push.refname, new = %push.new, "Push rejected: {}", e);

                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use radicle_patches::git::refs;
    use radicle_patches::push::Outcome;
    use radicle_patches::GitStore;

    use super::*;
    use crate::hooks::test::{commit, env, update};

    #[test]
    fn test_validate() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(tmp.path()).unwrap();
        let base = commit(&repo, "initial", &[]);
        let a = commit(&repo, "a", &[base]);
        let b = commit(&repo, "b", &[a]);
        let c = commit(&repo, "c", &[base]);
        let translator = storage::translator(GitStore::from(repo), &env(None));

        let id = match translator
            .handle(&update(refs::PATCHES, a).to_push(env(None).author, Default::default()))
            .unwrap()
        {
            Outcome::Opened(id) => id,
            other => panic!("unexpected outcome {:?}", other),
        };
        let canonical = refs::patch(&id);

        let pre = PreReceive {
            env: env(None),
            updates: vec![update(&canonical, b), update("refs/heads/master", c)],
        };
        pre.validate(&translator).unwrap();

        let pre = PreReceive {
            env: env(None),
            updates: vec![update("refs/heads/master", c), update(&canonical, c)],
        };
        assert!(matches!(pre.validate(&translator), Err(Error::Push(_))));

        let pre = PreReceive {
            env: env(None),
            updates: vec![update("refs/cobs/xyz.radicle.patch/abc", c)],
        };
        assert!(pre.validate(&translator).is_err());
    }
}
