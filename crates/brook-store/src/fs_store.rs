use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use brook_cbor::Hash;

use crate::{EntryKind, Store, StoreError, StoreResult, checked};

const STORE_DIR: &str = "store";

/// Filesystem store under `<root>/store/{nodes,blobs}/sha256/<hex>`.
///
/// Entries are immutable: a file is created once and synced, and a second
/// write of the same content finds it already present.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().join(STORE_DIR);
        for kind in [EntryKind::Node, EntryKind::Blob] {
            let dir = Self::kind_dir(&root, kind);
            fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;
        }
        Ok(Self { root })
    }

    fn kind_dir(root: &Path, kind: EntryKind) -> PathBuf {
        root.join(kind.dir_name()).join("sha256")
    }

    fn entry_path(&self, kind: EntryKind, hash: &Hash) -> PathBuf {
        Self::kind_dir(&self.root, kind).join(hash.hex_digits())
    }
}

impl Store for FsStore {
    fn put_entry(&self, kind: EntryKind, bytes: &[u8]) -> StoreResult<Hash> {
        let hash = Hash::of_bytes(bytes);
        let path = self.entry_path(kind, &hash);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(hash),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| StoreError::io(&path, err))?;
        Ok(hash)
    }

    fn get_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<Vec<u8>> {
        let path = self.entry_path(kind, &hash);
        match fs::read(&path) {
            Ok(bytes) => checked(kind, hash, bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound { kind, hash }),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn has_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<bool> {
        Ok(self.entry_path(kind, &hash).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct SnapshotHeader {
        processed_position: i64,
        parts: Vec<String>,
    }

    #[test]
    fn node_survives_reopen() {
        let dir = TempDir::new().expect("tmp");
        let value = SnapshotHeader {
            processed_position: 42,
            parts: vec!["workflow/instances".into()],
        };
        let hash = FsStore::open(dir.path())
            .expect("open")
            .put_node(&value)
            .expect("put");

        let reopened = FsStore::open(dir.path()).expect("reopen");
        assert!(reopened.has_entry(EntryKind::Node, hash).expect("has"));
        let loaded: SnapshotHeader = reopened.get_node(hash).expect("get");
        assert_eq!(value, loaded);
    }

    #[test]
    fn blob_writes_are_idempotent() {
        let dir = TempDir::new().expect("tmp");
        let store = FsStore::open(dir.path()).expect("open");
        let first = store.put_blob(b"index bytes").expect("put");
        let second = store.put_blob(b"index bytes").expect("put again");
        assert_eq!(first, second);
        assert_eq!(store.get_blob(first).expect("get"), b"index bytes");
        assert!(
            dir.path()
                .join("store/blobs/sha256")
                .join(first.hex_digits())
                .is_file()
        );
    }

    #[test]
    fn missing_and_tampered_entries_are_reported() {
        let dir = TempDir::new().expect("tmp");
        let store = FsStore::open(dir.path()).expect("open");
        let absent = Hash::of_bytes(b"never stored");
        assert!(matches!(
            store.get_blob(absent),
            Err(StoreError::NotFound { kind: EntryKind::Blob, .. })
        ));

        let hash = store.put_blob(b"original").expect("put");
        std::fs::write(store.entry_path(EntryKind::Blob, &hash), b"tampered").expect("tamper");
        assert!(matches!(
            store.get_blob(hash),
            Err(StoreError::Corrupt { kind: EntryKind::Blob, .. })
        ));
    }
}
