//! Event processors and the transitions they hand back to the controller.
//!
//! A processor never writes to the log itself. It inspects its state and the
//! event, then returns a [`Transition`]: the records to append, the state
//! updates to apply once those records are durable, and at most one response.
//! Updates may refer to positions the log assigns on write via [`KeyRef`].

pub mod deployment;
pub mod workflow;

use crate::error::KernelError;
use crate::event::{EventValue, Intent, LogId, LoggedEvent};
use crate::journal::{Journal, JournalRecord, LogPosition};
use crate::snapshot::SnapshotSupport;

pub trait EventProcessor: SnapshotSupport {
    type Update;

    /// Event filter; the controller skips every event this returns false for.
    fn accepts(&self, intent: Intent) -> bool;

    fn process_event(
        &mut self,
        event: &LoggedEvent,
        context: &ProcessingContext<'_>,
    ) -> Result<Transition<Self::Update>, KernelError>;

    /// Applies `updates`; `written` holds the positions of the transition's records.
    fn update_state(
        &mut self,
        updates: Vec<Self::Update>,
        written: &[LogPosition],
    ) -> Result<(), KernelError>;
}

/// Key of a record to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey {
    Explicit(i64),
    /// The key becomes the position the log assigns to the record.
    Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub key: RecordKey,
    pub intent: Intent,
    pub value: Vec<u8>,
}

impl OutboundRecord {
    pub fn new<V: EventValue>(key: RecordKey, value: &V) -> Result<Self, KernelError> {
        Ok(Self {
            key,
            intent: value.intent(),
            value: value.encode()?,
        })
    }
}

/// A key that is either known while processing or assigned by the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef {
    Known(i64),
    /// Position of the n-th record of the transition.
    Written(usize),
}

impl KeyRef {
    pub fn resolve(self, written: &[LogPosition]) -> Result<i64, KernelError> {
        match self {
            KeyRef::Known(key) => Ok(key),
            KeyRef::Written(index) => written.get(index).copied().ok_or_else(|| {
                KernelError::IllegalState(format!(
                    "record {index} of the transition was not written ({} written)",
                    written.len()
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingResponse {
    /// Index of the record the response reports.
    pub record: usize,
}

#[derive(Debug)]
pub struct Transition<U> {
    pub records: Vec<OutboundRecord>,
    pub updates: Vec<U>,
    pub response: Option<PendingResponse>,
}

impl<U> Default for Transition<U> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            updates: Vec::new(),
            response: None,
        }
    }
}

impl<U> Transition<U> {
    /// Nothing to write, nothing to update.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.updates.is_empty() && self.response.is_none()
    }

    /// Adds a record and returns its index within the transition.
    pub fn write<V: EventValue>(&mut self, key: RecordKey, value: &V) -> Result<usize, KernelError> {
        self.records.push(OutboundRecord::new(key, value)?);
        Ok(self.records.len() - 1)
    }

    pub fn update(&mut self, update: U) {
        self.updates.push(update);
    }

    pub fn respond(&mut self, record: usize) {
        self.response = Some(PendingResponse { record });
    }
}

/// Read access to events already in the log.
pub trait LogReader {
    fn read_event(&self, position: LogPosition) -> Result<Option<LoggedEvent>, KernelError>;
}

pub struct ProcessingContext<'a> {
    pub log: &'a LogId,
    reader: &'a dyn LogReader,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(log: &'a LogId, reader: &'a dyn LogReader) -> Self {
        Self { log, reader }
    }

    pub fn read_event(&self, position: LogPosition) -> Result<Option<LoggedEvent>, KernelError> {
        self.reader.read_event(position)
    }
}

pub(crate) struct JournalReader<'a> {
    pub journal: &'a dyn Journal,
    pub log: &'a LogId,
}

impl LogReader for JournalReader<'_> {
    fn read_event(&self, position: LogPosition) -> Result<Option<LoggedEvent>, KernelError> {
        let Some(entry) = self.journal.read_at(position)? else {
            return Ok(None);
        };
        match JournalRecord::decode(&entry)? {
            JournalRecord::Event(record) => {
                Ok(Some(LoggedEvent::from_record(position, record, self.log)))
            }
            JournalRecord::Snapshot(_) => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use super::*;
    use crate::event::{PROTOCOL_VERSION, RecordMetadata};

    pub fn log_id() -> LogId {
        LogId {
            topic: "default-topic".into(),
            partition_id: 0,
        }
    }

    /// Log stand-in for exercising processors without a controller.
    #[derive(Default)]
    pub struct EventLog {
        pub events: BTreeMap<LogPosition, LoggedEvent>,
    }

    impl EventLog {
        pub fn event<V: EventValue>(&mut self, position: LogPosition, key: i64, value: &V) -> LoggedEvent {
            let event = LoggedEvent {
                key,
                position,
                partition_id: 0,
                topic: "default-topic".into(),
                metadata: RecordMetadata {
                    intent: value.intent(),
                    protocol_version: PROTOCOL_VERSION,
                    source_event_position: None,
                    request: None,
                },
                value: value.encode().unwrap(),
            };
            self.events.insert(position, event.clone());
            event
        }
    }

    impl LogReader for EventLog {
        fn read_event(&self, position: LogPosition) -> Result<Option<LoggedEvent>, KernelError> {
            Ok(self.events.get(&position).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_keys_resolve_against_positions() {
        assert_eq!(KeyRef::Known(4).resolve(&[]).unwrap(), 4);
        assert_eq!(KeyRef::Written(1).resolve(&[10, 11]).unwrap(), 11);
        assert!(matches!(
            KeyRef::Written(2).resolve(&[10, 11]),
            Err(KernelError::IllegalState(_))
        ));
    }
}
