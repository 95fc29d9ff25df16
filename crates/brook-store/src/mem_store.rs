use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use brook_cbor::Hash;

use crate::{EntryKind, Store, StoreError, StoreResult, checked};

type Entries = HashMap<(EntryKind, Hash), Vec<u8>>;

/// In-memory store. Clones share the same entries, so a test can reopen a
/// processor over the store it used before.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: Arc<RwLock<Entries>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob_count(&self) -> usize {
        self.read()
            .keys()
            .filter(|(kind, _)| *kind == EntryKind::Blob)
            .count()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemStore {
    fn put_entry(&self, kind: EntryKind, bytes: &[u8]) -> StoreResult<Hash> {
        let hash = Hash::of_bytes(bytes);
        self.write()
            .entry((kind, hash))
            .or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn get_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<Vec<u8>> {
        let bytes = self
            .read()
            .get(&(kind, hash))
            .cloned()
            .ok_or(StoreError::NotFound { kind, hash })?;
        checked(kind, hash, bytes)
    }

    fn has_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<bool> {
        Ok(self.read().contains_key(&(kind, hash)))
    }
}
