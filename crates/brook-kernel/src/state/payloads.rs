use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::index::HashIndex;
use crate::journal::LogPosition;
use crate::snapshot::ComposedSnapshot;

/// Instance-scope payload as of the event at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPayload {
    pub position: LogPosition,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// Latest full payload per workflow instance, the merge base for task outputs.
#[derive(Debug, Clone, Default)]
pub struct PayloadCache {
    entries: HashIndex<i64, CachedPayload>,
}

impl PayloadCache {
    pub fn get(&self, workflow_instance_key: i64) -> Option<&CachedPayload> {
        self.entries.get(&workflow_instance_key)
    }

    pub fn put(&mut self, workflow_instance_key: i64, position: LogPosition, payload: Vec<u8>) {
        self.entries
            .put(workflow_instance_key, CachedPayload { position, payload });
    }

    pub fn remove(&mut self, workflow_instance_key: i64) -> Option<CachedPayload> {
        self.entries.remove(&workflow_instance_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_part(&self, name: &str, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        self.entries.write_part(name, snapshot)
    }

    pub fn recover_part(&mut self, name: &str, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.entries.recover_part(name, snapshot)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
