//! Content-addressed storage for processor snapshots, with filesystem and
//! in-memory backends.
//!
//! Backends only move verified bytes per [`EntryKind`]; typed nodes are
//! encoded as canonical CBOR by the provided trait methods, so equal values
//! always land on the same hash.

mod fs_store;
mod mem_store;

pub use fs_store::FsStore;
pub use mem_store::MemStore;

use brook_cbor::{Hash, to_canonical_cbor};
use serde::{Serialize, de::DeserializeOwned};
use std::{io, path::PathBuf};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Structured value, e.g. a snapshot header.
    Node,
    /// Opaque bytes, e.g. one serialized index.
    Blob,
}

impl EntryKind {
    pub(crate) fn dir_name(self) -> &'static str {
        match self {
            EntryKind::Node => "nodes",
            EntryKind::Blob => "blobs",
        }
    }
}

pub trait Store: Send + Sync {
    /// Stores `bytes` under their hash. Writing an existing entry is a no-op.
    fn put_entry(&self, kind: EntryKind, bytes: &[u8]) -> StoreResult<Hash>;

    /// Returns the entry's bytes after checking them against `hash`.
    fn get_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<Vec<u8>>;

    fn has_entry(&self, kind: EntryKind, hash: Hash) -> StoreResult<bool>;

    fn put_node<T: Serialize>(&self, value: &T) -> StoreResult<Hash> {
        self.put_entry(EntryKind::Node, &to_canonical_cbor(value)?)
    }

    fn get_node<T: DeserializeOwned>(&self, hash: Hash) -> StoreResult<T> {
        let bytes = self.get_entry(EntryKind::Node, hash)?;
        Ok(serde_cbor::from_slice(&bytes)?)
    }

    fn put_blob(&self, bytes: &[u8]) -> StoreResult<Hash> {
        self.put_entry(EntryKind::Blob, bytes)
    }

    fn get_blob(&self, hash: Hash) -> StoreResult<Vec<u8>> {
        self.get_entry(EntryKind::Blob, hash)
    }

    fn has_blob(&self, hash: Hash) -> StoreResult<bool> {
        self.has_entry(EntryKind::Blob, hash)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{kind:?} {hash} not found")]
    NotFound { kind: EntryKind, hash: Hash },
    #[error("node encoding failed: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("{kind:?} {expected} is corrupt: contents hash to {actual}")]
    Corrupt {
        kind: EntryKind,
        expected: Hash,
        actual: Hash,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Rejects bytes that do not match the hash they were stored under.
pub(crate) fn checked(kind: EntryKind, expected: Hash, bytes: Vec<u8>) -> StoreResult<Vec<u8>> {
    let actual = Hash::of_bytes(&bytes);
    if actual == expected {
        Ok(bytes)
    } else {
        Err(StoreError::Corrupt {
            kind,
            expected,
            actual,
        })
    }
}
