pub mod fs;
pub mod mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::RecordMetadata;

/// Position of an entry in the partition log. Dense and monotonic from 0.
pub type LogPosition = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    Event,
    Snapshot,
}

/// Typed payloads for each `JournalKind`, serialized into the entry payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "record_kind", rename_all = "snake_case")]
pub enum JournalRecord {
    Event(EventRecord),
    Snapshot(SnapshotRecord),
}

impl JournalRecord {
    pub fn kind(&self) -> JournalKind {
        match self {
            JournalRecord::Event(_) => JournalKind::Event,
            JournalRecord::Snapshot(_) => JournalKind::Snapshot,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, JournalError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn decode(entry: &OwnedJournalEntry) -> Result<Self, JournalError> {
        let record: JournalRecord = serde_cbor::from_slice(&entry.payload)?;
        if record.kind() != entry.kind {
            return Err(JournalError::Corrupt(format!(
                "entry {} is {:?} but holds a {:?} record",
                entry.position,
                entry.kind,
                record.kind()
            )));
        }
        Ok(record)
    }
}

/// An event as laid out in the log. A missing key means the key is the
/// position the log assigned to the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i64>,
    pub metadata: RecordMetadata,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Reference to the snapshot node in the store (`sha256:...`).
    pub snapshot_ref: String,
    /// Every entry up to and including this position is reflected in the snapshot.
    pub processed_position: LogPosition,
}

/// Borrowed entry used when appending to the journal.
#[derive(Debug, Clone, Copy)]
pub struct JournalEntry<'a> {
    pub kind: JournalKind,
    pub payload: &'a [u8],
}

impl<'a> JournalEntry<'a> {
    pub fn new(kind: JournalKind, payload: &'a [u8]) -> Self {
        Self { kind, payload }
    }
}

/// Owned entry returned by journal readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedJournalEntry {
    pub position: LogPosition,
    pub kind: JournalKind,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_cbor::Error),
    #[error("journal corrupt: {0}")]
    Corrupt(String),
}

/// Append-only partition log.
pub trait Journal: Send {
    /// Appends `entries` as one unit: either all of them become visible, at
    /// consecutive positions, or none do.
    fn append_batch(&mut self, entries: &[JournalEntry<'_>]) -> Result<Vec<LogPosition>, JournalError>;

    fn append(&mut self, entry: JournalEntry<'_>) -> Result<LogPosition, JournalError> {
        self.append_batch(&[entry])?
            .first()
            .copied()
            .ok_or_else(|| JournalError::Corrupt("append assigned no position".into()))
    }

    fn read_at(&self, position: LogPosition) -> Result<Option<OwnedJournalEntry>, JournalError>;

    fn load_from(&self, from: LogPosition) -> Result<Vec<OwnedJournalEntry>, JournalError>;

    fn next_position(&self) -> LogPosition;
}

#[derive(Serialize)]
pub(crate) struct DiskRecord<'a> {
    pub position: LogPosition,
    pub kind: JournalKind,
    #[serde(with = "serde_bytes")]
    pub payload: &'a [u8],
}
