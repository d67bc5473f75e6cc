/// Errors that may occur when running the radicle git hooks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Environmental variable error.
    #[error("environmental variable error: {0}")]
    VarError(#[from] std::env::VarError),

    /// Git error.
    #[error("git2 error: {0:?}")]
    Git2Error(#[from] git2::Error),

    /// Missing environmental variable.
    #[cfg(feature = "hooks")]
    #[error("missing environmental config variable: {0:?}")]
    EnvConfigError(#[from] envconfig::Error),

    /// A line of hook input could not be parsed.
    #[error("invalid ref update '{0}'")]
    InvalidUpdate(String),

    /// Object store error.
    #[error(transparent)]
    Store(#[from] radicle_patches::store::Error),

    /// The push was refused.
    #[error(transparent)]
    Push(#[from] radicle_patches::push::Error),
}
