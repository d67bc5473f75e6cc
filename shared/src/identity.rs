//! Identity value types.
//!
//! Keys are never created or verified here; these types only carry and encode
//! identifiers handed to us by the identity layer.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multicodec prefix of an ed25519 public key.
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];
/// URN prefix of a repository identifier.
pub const RAD_PREFIX: &str = "rad:";

#[derive(Error, Debug)]
pub enum IdError {
    #[error("invalid multibase string: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("invalid multicodec prefix")]
    Multicodec,
    #[error("invalid key: {0}")]
    Key(#[from] ed25519_consensus::Error),
    #[error("invalid length {0}")]
    Length(usize),
    #[error("missing '{0}' prefix")]
    Prefix(&'static str),
}

/// An ed25519 public key, encoded as a multibase `z6Mk..` string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PublicKey([u8; 32]);

/// A node on the network is identified by its public key.
pub type NodeId = PublicKey;

impl From<ed25519_consensus::VerificationKey> for PublicKey {
    fn from(key: ed25519_consensus::VerificationKey) -> Self {
        Self(key.to_bytes())
    }
}

impl TryFrom<[u8; 32]> for PublicKey {
    type Error = IdError;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Self::Error> {
        let key = ed25519_consensus::VerificationKey::try_from(bytes)?;

        Ok(Self::from(key))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::with_capacity(ED25519_MULTICODEC.len() + self.0.len());
        buf.extend_from_slice(&ED25519_MULTICODEC);
        buf.extend_from_slice(&self.0);

        f.write_str(&multibase::encode(multibase::Base::Base58Btc, buf))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, bytes) = multibase::decode(s)?;
        let key = bytes
            .strip_prefix(&ED25519_MULTICODEC)
            .ok_or(IdError::Multicodec)?;
        let key: [u8; 32] = key.try_into().map_err(|_| IdError::Length(key.len()))?;

        Self::try_from(key)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// A repository identifier, eg. `rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RepoId([u8; 20]);

impl From<[u8; 20]> for RepoId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            RAD_PREFIX,
            multibase::encode(multibase::Base::Base58Btc, self.0)
        )
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId({})", self)
    }
}

impl FromStr for RepoId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix(RAD_PREFIX).ok_or(IdError::Prefix(RAD_PREFIX))?;
        let (_, bytes) = multibase::decode(s)?;
        let bytes: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdError::Length(bytes.len()))?;

        Ok(Self(bytes))
    }
}

impl From<RepoId> for String {
    fn from(rid: RepoId) -> Self {
        rid.to_string()
    }
}

impl TryFrom<String> for RepoId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Deterministic identities for tests.
#[cfg(any(test, feature = "test"))]
pub mod test {
    use super::PublicKey;

    /// The public key of the signing key made of `seed` bytes.
    pub fn public_key(seed: u8) -> PublicKey {
        PublicKey::from(ed25519_consensus::SigningKey::from([seed; 32]).verification_key())
    }
}

#[cfg(any(test, feature = "test"))]
mod arbitrary {
    use quickcheck::Arbitrary;

    use super::*;

    impl Arbitrary for PublicKey {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let mut seed = [0u8; 32];
            for byte in seed.iter_mut() {
                *byte = u8::arbitrary(g);
            }
            let signer = ed25519_consensus::SigningKey::from(seed);

            Self::from(signer.verification_key())
        }
    }

    impl Arbitrary for RepoId {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let mut bytes = [0u8; 20];
            for byte in bytes.iter_mut() {
                *byte = u8::arbitrary(g);
            }
            Self(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_key_display_parse(key: PublicKey) {
        assert_eq!(key.to_string().parse::<PublicKey>().unwrap(), key);
    }

    #[quickcheck]
    fn prop_repo_display_parse(rid: RepoId) {
        let s = rid.to_string();

        assert!(s.starts_with("rad:z"));
        assert_eq!(s.parse::<RepoId>().unwrap(), rid);
    }

    #[test]
    fn test_key_encoding() {
        let signer = ed25519_consensus::SigningKey::from([0xff; 32]);
        let key = PublicKey::from(signer.verification_key());
        let encoded = key.to_string();

        assert!(encoded.starts_with("z6Mk"), "{}", encoded);
        assert_eq!(
            serde_json::to_value(key).unwrap(),
            serde_json::Value::String(encoded)
        );
    }

    #[test]
    fn test_invalid_ids() {
        assert!(matches!(
            "z3gqcJUoA1n9HaHKufZs5FCSGazv5".parse::<RepoId>(),
            Err(IdError::Prefix(_))
        ));
        assert!("rad:".parse::<RepoId>().is_err());
        assert!("z6Mk".parse::<PublicKey>().is_err());
        assert!("".parse::<PublicKey>().is_err());
    }
}
