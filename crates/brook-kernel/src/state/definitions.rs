use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::index::HashIndex;
use crate::journal::LogPosition;
use crate::snapshot::ComposedSnapshot;

/// Latest deployed version per process id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowVersionIndex {
    versions: HashIndex<String, i32>,
}

impl WorkflowVersionIndex {
    pub fn latest(&self, bpmn_process_id: &str) -> Option<i32> {
        self.versions.get(bpmn_process_id).copied()
    }

    pub fn next_version(&self, bpmn_process_id: &str) -> i32 {
        self.latest(bpmn_process_id).unwrap_or(0) + 1
    }

    /// Records `version` unless a later one is already known.
    pub fn put(&mut self, bpmn_process_id: &str, version: i32) {
        if self.latest(bpmn_process_id).is_none_or(|latest| latest < version) {
            self.versions.put(bpmn_process_id.to_string(), version);
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Process ids with their latest version, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.versions
            .sorted()
            .into_iter()
            .map(|(id, version)| (id.as_str(), *version))
    }

    pub fn write_part(&self, name: &str, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        self.versions.write_part(name, snapshot)
    }

    pub fn recover_part(&mut self, name: &str, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.versions.recover_part(name, snapshot)
    }

    pub fn clear(&mut self) {
        self.versions.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowDefinitionKey {
    pub bpmn_process_id: String,
    pub version: i32,
}

impl WorkflowDefinitionKey {
    pub fn new(bpmn_process_id: &str, version: i32) -> Self {
        Self {
            bpmn_process_id: bpmn_process_id.to_string(),
            version,
        }
    }
}

/// Log position of the accepted deployment that defines each workflow version.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPositionIndex {
    positions: HashIndex<WorkflowDefinitionKey, LogPosition>,
}

impl WorkflowPositionIndex {
    pub fn get(&self, key: &WorkflowDefinitionKey) -> Option<LogPosition> {
        self.positions.get(key).copied()
    }

    pub fn put(&mut self, key: WorkflowDefinitionKey, position: LogPosition) {
        self.positions.put(key, position);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn write_part(&self, name: &str, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        self.positions.write_part(name, snapshot)
    }

    pub fn recover_part(&mut self, name: &str, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.positions.recover_part(name, snapshot)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_only_move_forward() {
        let mut index = WorkflowVersionIndex::default();
        assert_eq!(index.next_version("order"), 1);
        index.put("order", 1);
        index.put("order", 3);
        index.put("order", 2);
        assert_eq!(index.latest("order"), Some(3));
        assert_eq!(index.next_version("order"), 4);
        assert_eq!(index.latest("invoice"), None);

        index.put("invoice", 1);
        let listed: Vec<_> = index.iter().collect();
        assert_eq!(listed, vec![("invoice", 1), ("order", 3)]);
    }

    #[test]
    fn positions_by_process_and_version() {
        let mut index = WorkflowPositionIndex::default();
        index.put(WorkflowDefinitionKey::new("order", 1), 4);
        index.put(WorkflowDefinitionKey::new("order", 2), 17);
        assert_eq!(index.get(&WorkflowDefinitionKey::new("order", 2)), Some(17));
        assert_eq!(index.get(&WorkflowDefinitionKey::new("order", 3)), None);
    }
}
