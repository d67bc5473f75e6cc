//! Access to the repository a push is received into.
use radicle_patches::git::refs;
use radicle_patches::{GitStore, Patches, Translator};

use super::types::ReceivePackEnv;
use crate::error::Error;

/// Open the repository of the running hook.
///
/// The repository is opened from the environment, so that objects still in the
/// push quarantine are visible to the `pre-receive` hook.
pub fn open(env: &ReceivePackEnv) -> Result<GitStore, Error> {
    let repo = git2::Repository::open_from_env()?;
    let store = GitStore::from(repo);

    tracing::debug!(
        git_dir = %env.git_dir.display(),
        namespace = ?env.git_namespace,
        "Opened repository"
    );
    match &env.git_namespace {
        Some(namespace) if !namespace.is_empty() => Ok(store.with_namespace(namespace)?),
        _ => Ok(store),
    }
}

/// Build the translator for pushes into a repository.
pub fn translator(store: GitStore, env: &ReceivePackEnv) -> Translator<GitStore> {
    Translator::new(Patches::new(store), env.default_branch.clone())
}

/// Delete the transient intake reference. Its content now lives in a patch.
pub fn remove_intake(store: &GitStore) -> Result<(), Error> {
    store.with_repository(|repo| match repo.find_reference(refs::PATCHES) {
        Ok(mut r) => r.delete(),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(e),
    })?;

    Ok(())
}
