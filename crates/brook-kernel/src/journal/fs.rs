use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use brook_cbor::to_canonical_cbor;

use super::{DiskRecord, Journal, JournalEntry, JournalError, LogPosition, OwnedJournalEntry};

const JOURNAL_DIR: &str = "journal";
const JOURNAL_FILE: &str = "journal.log";

/// Filesystem-backed journal.
///
/// Each appended batch is one length-prefixed canonical CBOR frame, synced
/// before the call returns. Entries are also kept in memory so reads by
/// position do not touch the file.
#[derive(Debug)]
pub struct FsJournal {
    path: PathBuf,
    entries: Vec<OwnedJournalEntry>,
}

impl FsJournal {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, JournalError> {
        let journal_dir = root.as_ref().join(JOURNAL_DIR);
        fs::create_dir_all(&journal_dir)?;
        let path = journal_dir.join(JOURNAL_FILE);
        if !path.exists() {
            File::create(&path)?;
        }
        let entries = read_all_frames(&path)?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FsJournal {
    fn append_batch(&mut self, entries: &[JournalEntry<'_>]) -> Result<Vec<LogPosition>, JournalError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let first = self.next_position();
        let records: Vec<DiskRecord<'_>> = entries
            .iter()
            .zip(first..)
            .map(|(entry, position)| DiskRecord {
                position,
                kind: entry.kind,
                payload: entry.payload,
            })
            .collect();
        let bytes = to_canonical_cbor(&records)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| JournalError::Corrupt("batch larger than 4GiB".into()))?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut frame = Vec::with_capacity(bytes.len() + 4);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&bytes);
        file.write_all(&frame)?;
        file.sync_all()?;

        let positions = records.iter().map(|record| record.position).collect();
        self.entries
            .extend(records.into_iter().map(|record| OwnedJournalEntry {
                position: record.position,
                kind: record.kind,
                payload: record.payload.to_vec(),
            }));
        Ok(positions)
    }

    fn read_at(&self, position: LogPosition) -> Result<Option<OwnedJournalEntry>, JournalError> {
        Ok(usize::try_from(position)
            .ok()
            .and_then(|index| self.entries.get(index))
            .cloned())
    }

    fn load_from(&self, from: LogPosition) -> Result<Vec<OwnedJournalEntry>, JournalError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.position >= from)
            .cloned()
            .collect())
    }

    fn next_position(&self) -> LogPosition {
        self.entries.len() as LogPosition
    }
}

fn read_all_frames(path: &Path) -> Result<Vec<OwnedJournalEntry>, JournalError> {
    let mut file = File::open(path)?;
    let mut entries: Vec<OwnedJournalEntry> = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        let read = file.read(&mut len_buf)?;
        if read == 0 {
            break;
        }
        if read < len_buf.len() {
            file.read_exact(&mut len_buf[read..]).map_err(|err| {
                if err.kind() == ErrorKind::UnexpectedEof {
                    JournalError::Corrupt(format!("truncated length header (read {read} bytes)"))
                } else {
                    err.into()
                }
            })?;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        if let Err(err) = file.read_exact(&mut buf) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Err(JournalError::Corrupt("truncated batch frame".into()));
            }
            return Err(err.into());
        }
        let batch: Vec<OwnedJournalEntry> = serde_cbor::from_slice(&buf)?;
        for entry in batch {
            let expected = entries.len() as LogPosition;
            if entry.position != expected {
                return Err(JournalError::Corrupt(format!(
                    "expected position {expected}, found {}",
                    entry.position
                )));
            }
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalKind;
    use tempfile::TempDir;

    #[test]
    fn writes_and_recovers_batches() {
        let tmp = TempDir::new().unwrap();
        let mut journal = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(journal.next_position(), 0);
        journal
            .append(JournalEntry::new(JournalKind::Event, b"a"))
            .unwrap();
        let positions = journal
            .append_batch(&[
                JournalEntry::new(JournalKind::Event, b"b"),
                JournalEntry::new(JournalKind::Event, b"c"),
            ])
            .unwrap();
        assert_eq!(positions, vec![1, 2]);

        let again = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(again.next_position(), 3);
        let entries = again.load_from(0).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].payload, b"c");
        assert_eq!(again.read_at(1).unwrap().unwrap().payload, b"b");
    }

    #[test]
    fn load_from_filters_positions() {
        let tmp = TempDir::new().unwrap();
        let mut journal = FsJournal::open(tmp.path()).unwrap();
        for payload in [b"one".as_ref(), b"two", b"three"] {
            journal
                .append(JournalEntry::new(JournalKind::Event, payload))
                .unwrap();
        }
        let entries = journal.load_from(2).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, b"three");
    }

    #[test]
    fn torn_batch_is_detected() {
        let tmp = TempDir::new().unwrap();
        {
            let mut journal = FsJournal::open(tmp.path()).unwrap();
            journal
                .append_batch(&[
                    JournalEntry::new(JournalKind::Event, b"cancel task"),
                    JournalEntry::new(JournalKind::Event, b"terminate activity"),
                ])
                .unwrap();
        }

        let log_path = tmp.path().join(JOURNAL_DIR).join(JOURNAL_FILE);
        let len = std::fs::metadata(&log_path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&log_path).unwrap();
        file.set_len(len - 1).unwrap();

        let err = FsJournal::open(tmp.path()).unwrap_err();
        assert!(matches!(err, JournalError::Corrupt(_)));
    }
}
