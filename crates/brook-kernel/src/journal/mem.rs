use std::sync::{Arc, Mutex, MutexGuard};

use super::{Journal, JournalEntry, JournalError, LogPosition, OwnedJournalEntry};

/// In-memory journal. Clones share the same log, so a test can keep a handle
/// after moving the journal into a controller.
#[derive(Debug, Default, Clone)]
pub struct MemJournal {
    entries: Arc<Mutex<Vec<OwnedJournalEntry>>>,
}

impl MemJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[OwnedJournalEntry]) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries.to_vec())),
        }
    }

    pub fn entries(&self) -> Vec<OwnedJournalEntry> {
        self.guard().clone()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<OwnedJournalEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Journal for MemJournal {
    fn append_batch(&mut self, entries: &[JournalEntry<'_>]) -> Result<Vec<LogPosition>, JournalError> {
        let mut guard = self.guard();
        let mut positions = Vec::with_capacity(entries.len());
        for entry in entries {
            let position = guard.len() as LogPosition;
            guard.push(OwnedJournalEntry {
                position,
                kind: entry.kind,
                payload: entry.payload.to_vec(),
            });
            positions.push(position);
        }
        Ok(positions)
    }

    fn read_at(&self, position: LogPosition) -> Result<Option<OwnedJournalEntry>, JournalError> {
        let guard = self.guard();
        Ok(usize::try_from(position)
            .ok()
            .and_then(|index| guard.get(index))
            .cloned())
    }

    fn load_from(&self, from: LogPosition) -> Result<Vec<OwnedJournalEntry>, JournalError> {
        let start = usize::try_from(from.max(0)).unwrap_or(0);
        Ok(self.guard().iter().skip(start).cloned().collect())
    }

    fn next_position(&self) -> LogPosition {
        self.guard().len() as LogPosition
    }
}
