use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use envconfig::Envconfig;
use radicle_patches::push::{Options, Push};
use radicle_patches::Oid;
use shared::{LogFmt, PublicKey};

use crate::error::Error;

/// `ReceivePackEnv` provides access to environmental variables set by `git-receive-pack`
/// and by the server spawning it. The values are used by both the `pre-receive` and
/// `post-receive` hooks within the `receive-pack` hook lifecycle.
///
/// Push options are not part of this struct, since their number is only known at
/// runtime; see [`ReceivePackEnv::push_options`].
#[derive(Debug, Clone, Envconfig)]
pub struct ReceivePackEnv {
    /// top-level git directory, set by `git-receive-pack`.
    #[envconfig(from = "GIT_DIR")]
    pub git_dir: PathBuf,

    /// namespace of the target repository.
    #[envconfig(from = "GIT_NAMESPACE")]
    pub git_namespace: Option<String>,

    /// number of push options sent with `git push -o`.
    #[envconfig(from = "GIT_PUSH_OPTION_COUNT")]
    pub push_option_count: Option<usize>,

    /// identity of the pusher, authenticated by the server.
    #[envconfig(from = "RADICLE_AUTHOR")]
    pub author: PublicKey,

    /// default branch of the repository. Pushes to it trigger merge detection.
    #[envconfig(from = "RADICLE_DEFAULT_BRANCH")]
    pub default_branch: Option<String>,

    /// either "plain" or "json".
    #[envconfig(from = "RADICLE_LOG_FORMAT", default = "plain")]
    pub log_format: LogFmt,
}

impl ReceivePackEnv {
    /// Push options, read from `GIT_PUSH_OPTION_<n>`.
    pub fn push_options(&self) -> Result<Vec<String>, Error> {
        (0..self.push_option_count.unwrap_or_default())
            .map(|i| env::var(format!("GIT_PUSH_OPTION_{}", i)).map_err(Error::from))
            .collect()
    }
}

/// A reference update, as read by hooks from standard input:
///
/// `sha1-old SP sha1-new SP refname LF`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub refname: String,
    pub old: Oid,
    pub new: Oid,
}

impl RefUpdate {
    pub fn to_push(&self, author: PublicKey, options: Options) -> Push {
        Push {
            refname: self.refname.clone(),
            old: self.old,
            new: self.new,
            author,
            options,
        }
    }
}

impl FromStr for RefUpdate {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidUpdate(line.to_owned());
        let mut input = line.split(' ');

        let old = input.next().ok_or_else(invalid)?;
        let new = input.next().ok_or_else(invalid)?;
        let refname = input.next().ok_or_else(invalid)?;

        if input.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            refname: refname.to_owned(),
            old: old.parse().map_err(|_| invalid())?,
            new: new.parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_update() {
        let zero = "0".repeat(40);
        let new = "d2a8e5e1ea6b1a9a7b6a0c2d0c3e0f6b1f0e5d1a";
        let update = format!("{} {} refs/patches", zero, new)
            .parse::<RefUpdate>()
            .unwrap();

        assert!(update.old.is_zero());
        assert_eq!(update.new.to_string(), new);
        assert_eq!(update.refname, "refs/patches");

        assert!("".parse::<RefUpdate>().is_err());
        assert!(format!("{} {}", zero, new).parse::<RefUpdate>().is_err());
        assert!(format!("{} xyz refs/patches", zero)
            .parse::<RefUpdate>()
            .is_err());
        assert!(format!("{} {} refs/patches extra", zero, new)
            .parse::<RefUpdate>()
            .is_err());
    }
}
