//! Composed processor snapshots.
//!
//! Every index contributes a named part. A stored snapshot is a node that
//! lists the parts by blob hash, so unchanged parts are shared between
//! snapshots in the content-addressed store.

use std::collections::BTreeMap;

use brook_cbor::Hash;
use brook_store::Store;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::journal::LogPosition;

/// Implemented by everything that keeps state across events.
pub trait SnapshotSupport {
    fn write_snapshot(&self, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError>;

    fn recover_from_snapshot(&mut self, snapshot: &ComposedSnapshot) -> Result<(), KernelError>;

    fn reset(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedSnapshot {
    parts: BTreeMap<String, Vec<u8>>,
}

impl ComposedSnapshot {
    pub fn add(&mut self, name: &str, bytes: Vec<u8>) {
        self.parts.insert(name.to_string(), bytes);
    }

    pub fn part(&self, name: &str) -> Result<&[u8], KernelError> {
        self.parts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| KernelError::SnapshotDecode(format!("snapshot has no part '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Writes the parts as blobs and a node referencing them; returns the node hash.
    pub fn store<S: Store>(&self, store: &S, processed_position: LogPosition) -> Result<Hash, KernelError> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for (name, bytes) in &self.parts {
            let hash = store.put_blob(bytes)?;
            parts.push(SnapshotPartRef {
                name: name.clone(),
                blob: hash.to_hex(),
            });
        }
        let node = ProcessorSnapshot {
            processed_position,
            parts,
        };
        Ok(store.put_node(&node)?)
    }

    pub fn load<S: Store>(store: &S, snapshot_ref: &str) -> Result<(LogPosition, Self), KernelError> {
        let hash = parse_ref(snapshot_ref)?;
        let node: ProcessorSnapshot = store.get_node(hash)?;
        let mut snapshot = ComposedSnapshot::default();
        for part in node.parts {
            let bytes = store.get_blob(parse_ref(&part.blob)?)?;
            snapshot.parts.insert(part.name, bytes);
        }
        Ok((node.processed_position, snapshot))
    }
}

fn parse_ref(value: &str) -> Result<Hash, KernelError> {
    Hash::from_hex_str(value)
        .map_err(|err| KernelError::SnapshotDecode(format!("invalid reference '{value}': {err}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProcessorSnapshot {
    processed_position: LogPosition,
    parts: Vec<SnapshotPartRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotPartRef {
    name: String,
    blob: String,
}
