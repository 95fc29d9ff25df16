use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::event::NO_KEY;
use crate::index::HashIndex;
use crate::journal::LogPosition;
use crate::snapshot::ComposedSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstanceEntry {
    /// Position of the event that created the instance.
    pub position: LogPosition,
    pub active_token_count: i32,
    /// Activity instance the instance is parked at, or `NO_KEY`.
    pub activity_instance_key: i64,
}

/// Live workflow instances by key. An entry exists exactly while the
/// instance has active tokens.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInstanceIndex {
    entries: HashIndex<i64, WorkflowInstanceEntry>,
}

impl WorkflowInstanceIndex {
    pub fn get(&self, workflow_instance_key: i64) -> Option<&WorkflowInstanceEntry> {
        self.entries.get(&workflow_instance_key)
    }

    pub fn is_active(&self, workflow_instance_key: i64) -> bool {
        self.get(workflow_instance_key)
            .is_some_and(|entry| entry.active_token_count > 0)
    }

    pub fn new_instance(&mut self, workflow_instance_key: i64, position: LogPosition) {
        self.entries.put(
            workflow_instance_key,
            WorkflowInstanceEntry {
                position,
                active_token_count: 1,
                activity_instance_key: NO_KEY,
            },
        );
    }

    pub fn set_activity_instance(&mut self, workflow_instance_key: i64, activity_instance_key: i64) {
        if let Some(entry) = self.entries.get_mut(&workflow_instance_key) {
            entry.activity_instance_key = activity_instance_key;
        }
    }

    /// Takes one token away; the entry disappears with its last token.
    /// Returns the remaining count, or `None` for an unknown instance.
    pub fn consume_token(&mut self, workflow_instance_key: i64) -> Option<i32> {
        let entry = self.entries.get_mut(&workflow_instance_key)?;
        entry.active_token_count = (entry.active_token_count - 1).max(0);
        let remaining = entry.active_token_count;
        if remaining == 0 {
            self.entries.remove(&workflow_instance_key);
        }
        Some(remaining)
    }

    pub fn remove(&mut self, workflow_instance_key: i64) -> Option<WorkflowInstanceEntry> {
        self.entries.remove(&workflow_instance_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &WorkflowInstanceEntry)> {
        self.entries.sorted().into_iter().map(|(key, entry)| (*key, entry))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_token_removes_entry() {
        let mut index = WorkflowInstanceIndex::default();
        index.new_instance(5, 1);
        assert!(index.is_active(5));
        if let Some(entry) = index.entries.get_mut(&5) {
            entry.active_token_count = 2;
        }
        assert_eq!(index.consume_token(5), Some(1));
        assert!(index.is_active(5));
        assert_eq!(index.consume_token(5), Some(0));
        assert!(index.get(5).is_none());
        assert_eq!(index.consume_token(5), None);
    }

    #[test]
    fn activity_reference() {
        let mut index = WorkflowInstanceIndex::default();
        index.new_instance(5, 1);
        assert_eq!(index.get(5).unwrap().activity_instance_key, NO_KEY);
        index.set_activity_instance(5, 9);
        assert_eq!(index.get(5).unwrap().activity_instance_key, 9);
        index.set_activity_instance(6, 9);
        assert!(index.get(6).is_none());
    }
}
