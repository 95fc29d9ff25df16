//! Drives the processors over one partition log.
//!
//! Events are handled strictly in log order. For every event the controller
//! asks the accepting processor for a transition, appends its records as one
//! batch, applies the state updates and finally sends the response. On open
//! the state is restored from the latest snapshot and the remaining log is
//! reprocessed: events whose records are already in the log are handled
//! again without writing, so the state catches up without duplicating output.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use brook_store::{Store, StoreError};

use crate::command::Command;
use crate::config::KernelConfig;
use crate::definition::{JsonWorkflowTransformer, WorkflowTransformer};
use crate::error::KernelError;
use crate::event::{LogId, LoggedEvent, PROTOCOL_VERSION, RecordMetadata, RequestMetadata};
use crate::journal::fs::FsJournal;
use crate::journal::mem::MemJournal;
use crate::journal::{
    EventRecord, Journal, JournalEntry, JournalKind, JournalRecord, LogPosition, SnapshotRecord,
};
use crate::processor::deployment::DeploymentProcessor;
use crate::processor::workflow::{WorkflowInstanceProcessor, WorkflowState};
use crate::processor::{
    EventProcessor, JournalReader, OutboundRecord, ProcessingContext, RecordKey,
};
use crate::response::{DiscardResponses, Response, ResponseSink};
use crate::snapshot::{ComposedSnapshot, SnapshotSupport};
use crate::state::WorkflowVersionIndex;

pub struct StreamProcessorBuilder<S: Store> {
    store: Arc<S>,
    journal: Box<dyn Journal>,
    config: KernelConfig,
    transformer: Arc<dyn WorkflowTransformer>,
    responses: Box<dyn ResponseSink>,
}

impl<S: Store + 'static> StreamProcessorBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            journal: Box::new(MemJournal::new()),
            config: KernelConfig::default(),
            transformer: Arc::new(JsonWorkflowTransformer),
            responses: Box::new(DiscardResponses),
        }
    }

    pub fn with_journal(mut self, journal: Box<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_fs_journal(mut self, root: impl AsRef<Path>) -> Result<Self, KernelError> {
        self.journal = Box::new(FsJournal::open(root)?);
        Ok(self)
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn WorkflowTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_responses(mut self, responses: Box<dyn ResponseSink>) -> Self {
        self.responses = responses;
        self
    }

    /// Builds the controller and recovers its state from the log.
    pub fn open(self) -> Result<StreamProcessorController<S>, KernelError> {
        let log = LogId {
            topic: self.config.topic_name.clone(),
            partition_id: self.config.partition_id,
        };
        let mut controller = StreamProcessorController {
            deployments: DeploymentProcessor::new(Arc::clone(&self.transformer)),
            workflows: WorkflowInstanceProcessor::new(self.transformer, &self.config),
            journal: self.journal,
            store: self.store,
            responses: self.responses,
            config: self.config,
            log,
            cursor: 0,
            reprocess_until: None,
            recorded_writes: HashMap::new(),
            processed_since_snapshot: 0,
        };
        controller.recover()?;
        Ok(controller)
    }
}

pub struct StreamProcessorController<S: Store> {
    journal: Box<dyn Journal>,
    store: Arc<S>,
    config: KernelConfig,
    log: LogId,
    deployments: DeploymentProcessor,
    workflows: WorkflowInstanceProcessor,
    responses: Box<dyn ResponseSink>,
    /// Next log position to process.
    cursor: LogPosition,
    /// Events up to here already have their records in the log.
    reprocess_until: Option<LogPosition>,
    /// Positions of records found in the log, by the event that wrote them.
    recorded_writes: HashMap<LogPosition, Vec<LogPosition>>,
    processed_since_snapshot: u64,
}

impl<S: Store + 'static> StreamProcessorController<S> {
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn log_id(&self) -> &LogId {
        &self.log
    }

    /// Position of the next entry to process.
    pub fn position(&self) -> LogPosition {
        self.cursor
    }

    pub fn head(&self) -> LogPosition {
        self.journal.next_position()
    }

    pub fn workflow_state(&self) -> &WorkflowState {
        self.workflows.state()
    }

    pub fn deployed_versions(&self) -> &WorkflowVersionIndex {
        self.deployments.versions()
    }

    /// Appends a client command and returns its position.
    pub fn submit(&mut self, command: Command) -> Result<LogPosition, KernelError> {
        let position = self.journal.next_position();
        let request = RequestMetadata {
            request_id: u64::try_from(position).unwrap_or_default(),
            stream_id: 0,
        };
        let record = EventRecord {
            key: match command.key {
                RecordKey::Explicit(key) => Some(key),
                RecordKey::Position => None,
            },
            metadata: RecordMetadata {
                intent: command.intent,
                protocol_version: PROTOCOL_VERSION,
                source_event_position: None,
                request: Some(request),
            },
            value: command.value,
        };
        let payload = JournalRecord::Event(record).encode()?;
        let position = self
            .journal
            .append(JournalEntry::new(JournalKind::Event, &payload))?;
        log::debug!("submitted {:?} at position {position}", command.intent);
        Ok(position)
    }

    pub fn read_event(&self, position: LogPosition) -> Result<Option<LoggedEvent>, KernelError> {
        use crate::processor::LogReader;
        JournalReader {
            journal: self.journal.as_ref(),
            log: &self.log,
        }
        .read_event(position)
    }

    /// Events from `from` on, skipping snapshot entries.
    pub fn events_from(&self, from: LogPosition) -> Result<Vec<LoggedEvent>, KernelError> {
        let mut events = Vec::new();
        for entry in self.journal.load_from(from)? {
            if let JournalRecord::Event(record) = JournalRecord::decode(&entry)? {
                events.push(LoggedEvent::from_record(entry.position, record, &self.log));
            }
        }
        Ok(events)
    }

    /// Processes the entry at the cursor. Returns its position, or `None` at
    /// the head of the log. A failed event is not skipped: the cursor stays
    /// on it and the next call handles it again.
    pub fn process_next(&mut self) -> Result<Option<LogPosition>, KernelError> {
        let Some(entry) = self.journal.read_at(self.cursor)? else {
            return Ok(None);
        };
        let position = entry.position;
        let mut live = false;
        if let JournalRecord::Event(record) = JournalRecord::decode(&entry)? {
            let event = LoggedEvent::from_record(position, record, &self.log);
            live = !self.reprocess_until.is_some_and(|until| position <= until);
            if let Err(err) = self.dispatch(&event, live) {
                log::error!(
                    "processing {:?} at position {position} failed: {err}",
                    event.intent()
                );
                return Err(err);
            }
        }
        self.cursor = position + 1;
        if live {
            self.processed_since_snapshot += 1;
            self.maybe_snapshot();
        }
        Ok(Some(position))
    }

    /// Processes until the head of the log, including records written on the way.
    pub fn process_available(&mut self) -> Result<usize, KernelError> {
        let mut processed = 0;
        while self.process_next()?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Stores the state of all processors and records the snapshot in the log.
    pub fn create_snapshot(&mut self) -> Result<SnapshotRecord, KernelError> {
        let processed_position = self.cursor - 1;
        let snapshot = self.state_snapshot()?;
        let hash = snapshot.store(self.store.as_ref(), processed_position)?;
        let record = SnapshotRecord {
            snapshot_ref: hash.to_hex(),
            processed_position,
        };
        let payload = JournalRecord::Snapshot(record.clone()).encode()?;
        self.journal
            .append(JournalEntry::new(JournalKind::Snapshot, &payload))?;
        self.processed_since_snapshot = 0;
        log::info!(
            "snapshot {} covers log up to position {processed_position}",
            record.snapshot_ref
        );
        Ok(record)
    }

    /// The processors' state as it would be snapshotted.
    pub fn state_snapshot(&self) -> Result<ComposedSnapshot, KernelError> {
        let mut snapshot = ComposedSnapshot::default();
        self.deployments.write_snapshot(&mut snapshot)?;
        self.workflows.write_snapshot(&mut snapshot)?;
        Ok(snapshot)
    }

    fn maybe_snapshot(&mut self) {
        let Some(interval) = self.config.snapshot_interval else {
            return;
        };
        if self.processed_since_snapshot < interval {
            return;
        }
        if let Err(err) = self.create_snapshot() {
            log::warn!("automatic snapshot failed: {err}");
        }
    }

    fn dispatch(&mut self, event: &LoggedEvent, live: bool) -> Result<(), KernelError> {
        let recorded = if live {
            None
        } else {
            Some(
                self.recorded_writes
                    .get(&event.position)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            )
        };
        let mut output = Output {
            journal: self.journal.as_mut(),
            responses: self.responses.as_mut(),
            log: &self.log,
            recorded,
        };
        if self.deployments.accepts(event.intent()) {
            output.run(&mut self.deployments, event)
        } else if self.workflows.accepts(event.intent()) {
            output.run(&mut self.workflows, event)
        } else {
            Ok(())
        }
    }

    fn recover(&mut self) -> Result<(), KernelError> {
        let mut start = 0;
        if self.config.recover_from_snapshot {
            if let Some(record) = self.latest_snapshot()? {
                match self.restore_snapshot(&record) {
                    Ok(()) => start = record.processed_position + 1,
                    Err(KernelError::SnapshotUnavailable(reason)) => {
                        log::warn!("snapshot {reason} is unavailable, replaying the whole log");
                        self.deployments.reset();
                        self.workflows.reset();
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.cursor = start;
        self.recorded_writes.clear();
        for entry in self.journal.load_from(start)? {
            if let JournalRecord::Event(record) = JournalRecord::decode(&entry)? {
                if let Some(source) = record.metadata.source_event_position {
                    self.recorded_writes
                        .entry(source)
                        .or_default()
                        .push(entry.position);
                }
            }
        }
        self.reprocess_until = self.recorded_writes.keys().max().copied();
        log::info!(
            "recovered partition {} of '{}' from position {start}, log head at {}",
            self.log.partition_id,
            self.log.topic,
            self.journal.next_position()
        );
        Ok(())
    }

    fn latest_snapshot(&self) -> Result<Option<SnapshotRecord>, KernelError> {
        let mut latest = None;
        for entry in self.journal.load_from(0)? {
            if entry.kind != JournalKind::Snapshot {
                continue;
            }
            if let JournalRecord::Snapshot(record) = JournalRecord::decode(&entry)? {
                latest = Some(record);
            }
        }
        Ok(latest)
    }

    fn restore_snapshot(&mut self, record: &SnapshotRecord) -> Result<(), KernelError> {
        let (processed_position, snapshot) =
            match ComposedSnapshot::load(self.store.as_ref(), &record.snapshot_ref) {
                Ok(loaded) => loaded,
                Err(KernelError::Store(StoreError::NotFound { .. })) => {
                    return Err(KernelError::SnapshotUnavailable(record.snapshot_ref.clone()));
                }
                Err(err) => return Err(err),
            };
        if processed_position != record.processed_position {
            return Err(KernelError::SnapshotDecode(format!(
                "snapshot {} covers position {processed_position}, log record says {}",
                record.snapshot_ref, record.processed_position
            )));
        }
        self.deployments.recover_from_snapshot(&snapshot)?;
        self.workflows.recover_from_snapshot(&snapshot)?;
        log::info!(
            "restored snapshot {} at position {processed_position}",
            record.snapshot_ref
        );
        Ok(())
    }
}

/// Where the records, updates and response of one transition go.
struct Output<'a> {
    journal: &'a mut dyn Journal,
    responses: &'a mut dyn ResponseSink,
    log: &'a LogId,
    /// Set while reprocessing: the positions already holding this event's records.
    recorded: Option<&'a [LogPosition]>,
}

impl Output<'_> {
    fn run<P: EventProcessor>(&mut self, processor: &mut P, event: &LoggedEvent) -> Result<(), KernelError> {
        let transition = {
            let reader = JournalReader {
                journal: &*self.journal,
                log: self.log,
            };
            let context = ProcessingContext::new(self.log, &reader);
            processor.process_event(event, &context)?
        };

        let written = match self.recorded {
            Some(recorded) => {
                if recorded.len() != transition.records.len() {
                    return Err(KernelError::IllegalState(format!(
                        "reprocessing position {} produced {} records, the log holds {}",
                        event.position,
                        transition.records.len(),
                        recorded.len()
                    )));
                }
                recorded.to_vec()
            }
            None => self.write(event, &transition.records)?,
        };

        processor.update_state(transition.updates, &written)?;

        if self.recorded.is_some() {
            return Ok(());
        }
        let (Some(pending), Some(request)) = (transition.response, event.metadata.request) else {
            return Ok(());
        };
        let (Some(record), Some(position)) = (
            transition.records.get(pending.record),
            written.get(pending.record),
        ) else {
            return Err(KernelError::IllegalState(format!(
                "response refers to record {} of {}",
                pending.record,
                transition.records.len()
            )));
        };
        let response = Response {
            request,
            key: match record.key {
                RecordKey::Explicit(key) => key,
                RecordKey::Position => *position,
            },
            position: *position,
            intent: record.intent,
            value: record.value.clone(),
        };
        if let Err(err) = self.responses.send(response) {
            log::warn!(
                "dropping response to request {} for position {}: {err}",
                request.request_id,
                event.position
            );
        }
        Ok(())
    }

    fn write(
        &mut self,
        event: &LoggedEvent,
        records: &[OutboundRecord],
    ) -> Result<Vec<LogPosition>, KernelError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            let record = EventRecord {
                key: match record.key {
                    RecordKey::Explicit(key) => Some(key),
                    RecordKey::Position => None,
                },
                metadata: RecordMetadata {
                    intent: record.intent,
                    protocol_version: PROTOCOL_VERSION,
                    source_event_position: Some(event.position),
                    request: None,
                },
                value: record.value.clone(),
            };
            payloads.push(JournalRecord::Event(record).encode()?);
        }
        let entries: Vec<JournalEntry<'_>> = payloads
            .iter()
            .map(|payload| JournalEntry::new(JournalKind::Event, payload))
            .collect();
        Ok(self.journal.append_batch(&entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::MemResponseSink;
    use brook_store::MemStore;

    #[test]
    fn empty_log_has_nothing_to_process() {
        let mut controller = StreamProcessorBuilder::new(Arc::new(MemStore::new()))
            .open()
            .unwrap();
        assert_eq!(controller.process_next().unwrap(), None);
        assert_eq!(controller.process_available().unwrap(), 0);
        assert_eq!(controller.position(), 0);
    }

    #[test]
    fn rejected_deployment_is_answered() {
        let sink = MemResponseSink::new();
        let mut controller = StreamProcessorBuilder::new(Arc::new(MemStore::new()))
            .with_responses(Box::new(sink.clone()))
            .open()
            .unwrap();
        let position = controller
            .submit(Command::deploy(b"{\"processes\": []}".to_vec()).unwrap())
            .unwrap();
        controller.process_available().unwrap();

        let responses = sink.take();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].key, position);
        assert_eq!(responses[0].request.request_id, position as u64);
        let events = controller.events_from(0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].metadata.source_event_position, Some(position));
    }
}
