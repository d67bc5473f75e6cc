//! Policy table persistence.
//!
//! Both tables live in one JSON file, rewritten in full on every mutation.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shared::{NodeId, RepoId};

use super::Scope;

/// Seeding table entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seeding {
    pub scope: Scope,
    pub fetch: bool,
}

/// Follow table entry.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Follow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// The seeding and follow tables.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    #[serde(default)]
    pub seeding: BTreeMap<RepoId, Seeding>,
    #[serde(default)]
    pub follow: BTreeMap<NodeId, Follow>,
}

/// Policy store.
#[derive(Debug)]
pub struct Store {
    /// Underlying file, if any.
    file: Option<fs::File>,
    /// Deserialized tables.
    pub tables: Tables,
}

impl Store {
    /// Open an existing policy file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .and_then(Self::from)
    }

    /// Create a new, empty policy file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        let mut store = Self {
            file: Some(file),
            tables: Tables::default(),
        };
        store.write()?;

        Ok(store)
    }

    /// A store that is never written to disk.
    pub fn memory() -> Self {
        Self {
            file: None,
            tables: Tables::default(),
        }
    }

    pub fn from(mut file: fs::File) -> io::Result<Self> {
        use io::Read;

        let mut s = String::new();
        file.read_to_string(&mut s)?;

        let tables = if !s.trim().is_empty() {
            serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            Tables::default()
        };
        Ok(Self {
            file: Some(file),
            tables,
        })
    }

    pub fn write(&mut self) -> io::Result<()> {
        use io::{Seek, Write};

        let file = match &mut self.file {
            Some(file) => file,
            None => return Ok(()),
        };
        let s = serde_json::to_string_pretty(&self.tables)?;

        file.set_len(0)?;
        file.seek(io::SeekFrom::Start(0))?;
        file.write_all(s.as_bytes())?;
        file.write_all(&[b'\n'])?;
        file.sync_data()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::arbitrary;

    #[test]
    fn test_create_write_open() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("policies.json");
        let rid = arbitrary::gen::<RepoId>(1);
        let nid = arbitrary::gen::<NodeId>(1);

        let mut store = Store::create(&path).unwrap();
        assert!(Store::create(&path).is_err());

        store.tables.seeding.insert(
            rid,
            Seeding {
                scope: Scope::Followed,
                fetch: true,
            },
        );
        store.tables.follow.insert(
            nid,
            Follow {
                alias: Some(String::from("alice")),
            },
        );
        store.write().unwrap();
        // Shrinking the tables must not leave stale bytes behind.
        store.tables.follow.clear();
        store.write().unwrap();
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.tables.seeding.len(), 1);
        assert_eq!(store.tables.seeding[&rid].scope, Scope::Followed);
        assert!(store.tables.follow.is_empty());
    }

    #[test]
    fn test_open_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("policies.json");

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            Store::open(&path).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );

        fs::write(&path, "").unwrap();
        assert_eq!(Store::open(&path).unwrap().tables, Tables::default());
    }
}
