//! # POST-RECEIVE HOOK
//!
//! <https://git-scm.com/docs/githooks#post-receive>
//!
//! # Use by Radicle Git-Server
//!
//! The `post-receive` git hook runs once all references were updated, and turns the
//! updates into patch operations: pushes to the intake reference open or revise patches,
//! pushes to canonical patch references revise them, and pushes to the default branch
//! mark merged patches. The transient intake reference is deleted afterwards.
use std::io::stdin;

use envconfig::Envconfig;
use radicle_patches::push::Outcome;
use radicle_patches::{ObjectStore, Translator};

use super::storage;
use super::types::{ReceivePackEnv, RefUpdate};
use crate::error::Error;

/// `PostReceive` provides access to the standard input values passed into the `post-receive`
/// git hook, as well as parses environmental variables that may be used to process the hook.
#[derive(Debug, Clone)]
pub struct PostReceive {
    /// Environmental variables.
    pub env: ReceivePackEnv,
    /// Ref updates.
    pub updates: Vec<RefUpdate>,
}

impl PostReceive {
    /// Instantiate from standard input.
    pub fn from_stdin() -> Result<Self, Error> {
        let env = ReceivePackEnv::init_from_env()?;
        let updates = super::read_updates(stdin().lock())?;

        Ok(Self { env, updates })
    }

    /// The main process used by `post-receive` hook.
    pub fn hook() -> Result<(), Error> {
        println!("Running post-receive hook...");

        let post_receive = Self::from_stdin()?;
        shared::init_logger(post_receive.env.log_format);

        let store = storage::open(&post_receive.env)?;
        let translator = storage::translator(store, &post_receive.env);
        let result = post_receive.apply(&translator);

        // The intake reference is removed even if a later update failed.
        storage::remove_intake(translator.patches().store())?;

        for outcome in result? {
            match outcome {
                Outcome::Ignored => {}
                Outcome::Merged(ids) if ids.is_empty() => {}
                outcome => println!("{}", outcome),
            }
        }
        Ok(())
    }

    /// Apply every update, in order.
    pub fn apply<S: ObjectStore>(&self, translator: &Translator<S>) -> Result<Vec<Outcome>, Error> {
        let mut outcomes = Vec::new();

        for push in super::pushes(&self.env, &self.updates)? {
            let outcome = match translator.handle(&push) {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("Failed to apply update to {}: {}", push.refname, e);

                    if let Err(err) = translator.restore(&push) {
                        tracing::error!(refname = %push.refname, "Failed to restore reference: {}", err);
                    }
                    return Err(e.into());
                }
            };
            tracing::info!(refname = %push.refname, new = %push.new, "{}", outcome);

            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
