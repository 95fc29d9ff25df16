use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::event::NO_KEY;
use crate::index::HashIndex;
use crate::snapshot::ComposedSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInstanceEntry {
    pub activity_id: String,
    /// Key of the open task, or `NO_KEY`.
    pub task_key: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityInstanceIndex {
    entries: HashIndex<i64, ActivityInstanceEntry>,
}

impl ActivityInstanceIndex {
    pub fn get(&self, activity_instance_key: i64) -> Option<&ActivityInstanceEntry> {
        self.entries.get(&activity_instance_key)
    }

    pub fn new_activity_instance(&mut self, activity_instance_key: i64, activity_id: &str) {
        self.entries.put(
            activity_instance_key,
            ActivityInstanceEntry {
                activity_id: activity_id.to_string(),
                task_key: NO_KEY,
            },
        );
    }

    pub fn set_task_key(&mut self, activity_instance_key: i64, task_key: i64) {
        if let Some(entry) = self.entries.get_mut(&activity_instance_key) {
            entry.task_key = task_key;
        }
    }

    /// True when `task_key` is the open task of the activity instance.
    pub fn has_open_task(&self, activity_instance_key: i64, task_key: i64) -> bool {
        task_key != NO_KEY
            && self
                .get(activity_instance_key)
                .is_some_and(|entry| entry.task_key == task_key)
    }

    pub fn remove(&mut self, activity_instance_key: i64) -> Option<ActivityInstanceEntry> {
        self.entries.remove(&activity_instance_key)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_task_matching() {
        let mut index = ActivityInstanceIndex::default();
        index.new_activity_instance(12, "collect-money");
        assert!(!index.has_open_task(12, NO_KEY));
        index.set_task_key(12, 14);
        assert!(index.has_open_task(12, 14));
        assert!(!index.has_open_task(12, 15));
        index.set_task_key(12, NO_KEY);
        assert!(!index.has_open_task(12, 14));
        assert_eq!(index.remove(12).unwrap().activity_id, "collect-money");
        assert!(index.is_empty());
    }
}
