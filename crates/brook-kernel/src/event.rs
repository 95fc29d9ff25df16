//! Event values and record metadata.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::KernelError;
use crate::journal::{EventRecord, LogPosition};

pub const PROTOCOL_VERSION: u16 = 1;

/// Version value of a create command that asks for the latest deployment.
pub const LATEST_VERSION: i32 = -1;

/// Key value meaning "none" for task and activity-instance references.
pub const NO_KEY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Deployment,
    WorkflowInstance,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentEventType {
    CreateDeployment,
    DeploymentCreated,
    DeploymentRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowInstanceEventType {
    CreateWorkflowInstance,
    WorkflowInstanceCreated,
    WorkflowInstanceRejected,
    StartEventOccurred,
    EndEventOccurred,
    SequenceFlowTaken,
    ActivityReady,
    ActivityActivated,
    ActivityCompleting,
    ActivityCompleted,
    ActivityTerminated,
    WorkflowInstanceCompleted,
    CancelWorkflowInstance,
    WorkflowInstanceCanceled,
    CancelWorkflowInstanceRejected,
    UpdatePayload,
    PayloadUpdated,
    UpdatePayloadRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    Create,
    Created,
    Complete,
    Completed,
    Cancel,
    Canceled,
}

/// Value type plus event type, carried in the record metadata so processors
/// can filter records without decoding their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "event_type", rename_all = "snake_case")]
pub enum Intent {
    Deployment(DeploymentEventType),
    WorkflowInstance(WorkflowInstanceEventType),
    Task(TaskEventType),
}

impl Intent {
    pub fn value_type(&self) -> ValueType {
        match self {
            Intent::Deployment(_) => ValueType::Deployment,
            Intent::WorkflowInstance(_) => ValueType::WorkflowInstance,
            Intent::Task(_) => ValueType::Task,
        }
    }
}

/// Routes a response back to the client that wrote a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_id: u64,
    pub stream_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub intent: Intent,
    pub protocol_version: u16,
    /// Position of the event whose processing wrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_position: Option<LogPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestMetadata>,
}

/// Topic and partition a processor runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogId {
    pub topic: String,
    pub partition_id: u32,
}

/// An event read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub key: i64,
    pub position: LogPosition,
    pub partition_id: u32,
    pub topic: String,
    pub metadata: RecordMetadata,
    pub value: Vec<u8>,
}

impl LoggedEvent {
    pub fn from_record(position: LogPosition, record: EventRecord, log: &LogId) -> Self {
        Self {
            key: record.key.unwrap_or(position),
            position,
            partition_id: log.partition_id,
            topic: log.topic.clone(),
            metadata: record.metadata,
            value: record.value,
        }
    }

    pub fn intent(&self) -> Intent {
        self.metadata.intent
    }

    pub fn decode<T: EventValue>(&self) -> Result<T, KernelError> {
        serde_cbor::from_slice(&self.value).map_err(|err| KernelError::Decode {
            what: T::NAME,
            position: self.position,
            message: err.to_string(),
        })
    }
}

/// A typed record value.
pub trait EventValue: Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn intent(&self) -> Intent;

    fn encode(&self) -> Result<Vec<u8>, KernelError> {
        serde_cbor::to_vec(self).map_err(|err| KernelError::Encode {
            what: Self::NAME,
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedWorkflow {
    pub bpmn_process_id: String,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub event_type: DeploymentEventType,
    #[serde(with = "serde_bytes")]
    pub resource: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed_workflows: Vec<DeployedWorkflow>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl DeploymentEvent {
    pub fn create(resource: Vec<u8>) -> Self {
        Self {
            event_type: DeploymentEventType::CreateDeployment,
            resource,
            deployed_workflows: Vec::new(),
            error_message: String::new(),
        }
    }
}

impl EventValue for DeploymentEvent {
    const NAME: &'static str = "deployment event";

    fn intent(&self) -> Intent {
        Intent::Deployment(self.event_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstanceEvent {
    pub event_type: WorkflowInstanceEventType,
    pub bpmn_process_id: String,
    pub version: i32,
    pub workflow_instance_key: i64,
    #[serde(default)]
    pub activity_id: String,
    #[serde(default, with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl WorkflowInstanceEvent {
    pub fn create(bpmn_process_id: impl Into<String>, version: Option<i32>, payload: Vec<u8>) -> Self {
        Self {
            event_type: WorkflowInstanceEventType::CreateWorkflowInstance,
            bpmn_process_id: bpmn_process_id.into(),
            version: version.unwrap_or(LATEST_VERSION),
            workflow_instance_key: NO_KEY,
            activity_id: String::new(),
            payload,
        }
    }

    /// Same instance and payload, new event type.
    pub fn next(&self, event_type: WorkflowInstanceEventType) -> Self {
        Self {
            event_type,
            ..self.clone()
        }
    }

    /// Same instance and payload, new event type at another element.
    pub fn next_at(&self, event_type: WorkflowInstanceEventType, activity_id: &str) -> Self {
        Self {
            event_type,
            activity_id: activity_id.to_string(),
            ..self.clone()
        }
    }
}

impl EventValue for WorkflowInstanceEvent {
    const NAME: &'static str = "workflow instance event";

    fn intent(&self) -> Intent {
        Intent::WorkflowInstance(self.event_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHeader {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHeaders {
    pub bpmn_process_id: String,
    pub workflow_definition_version: i32,
    pub workflow_instance_key: i64,
    pub activity_id: String,
    pub activity_instance_key: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_headers: Vec<TaskHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    #[serde(rename = "type")]
    pub task_type: String,
    pub retries: i32,
    #[serde(default, with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub headers: TaskHeaders,
}

impl TaskEvent {
    /// The completion a worker reports for this task.
    pub fn completed(&self, payload: Vec<u8>) -> Self {
        Self {
            event_type: TaskEventType::Completed,
            payload,
            ..self.clone()
        }
    }
}

impl EventValue for TaskEvent {
    const NAME: &'static str = "task event";

    fn intent(&self) -> Intent {
        Intent::Task(self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_metadata_round_trip() {
        let metadata = RecordMetadata {
            intent: Intent::WorkflowInstance(WorkflowInstanceEventType::ActivityReady),
            protocol_version: PROTOCOL_VERSION,
            source_event_position: Some(7),
            request: None,
        };
        let bytes = serde_cbor::to_vec(&metadata).unwrap();
        let decoded: RecordMetadata = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(decoded, metadata);
        assert_eq!(decoded.intent.value_type(), ValueType::WorkflowInstance);

        let json = serde_json::to_value(metadata.intent).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value_type": "workflow_instance", "event_type": "ACTIVITY_READY"})
        );
    }

    #[test]
    fn record_without_key_uses_position() {
        let value = WorkflowInstanceEvent::create("order", None, Vec::new());
        let record = EventRecord {
            key: None,
            metadata: RecordMetadata {
                intent: value.intent(),
                protocol_version: PROTOCOL_VERSION,
                source_event_position: None,
                request: None,
            },
            value: value.encode().unwrap(),
        };
        let log = LogId {
            topic: "default-topic".into(),
            partition_id: 0,
        };
        let event = LoggedEvent::from_record(12, record, &log);
        assert_eq!(event.key, 12);
        let decoded: WorkflowInstanceEvent = event.decode().unwrap();
        assert_eq!(decoded.version, LATEST_VERSION);
        assert_eq!(decoded.bpmn_process_id, "order");
    }

    #[test]
    fn decode_failure_names_the_position() {
        let log = LogId {
            topic: "t".into(),
            partition_id: 1,
        };
        let record = EventRecord {
            key: Some(3),
            metadata: RecordMetadata {
                intent: Intent::Task(TaskEventType::Completed),
                protocol_version: PROTOCOL_VERSION,
                source_event_position: None,
                request: None,
            },
            value: vec![0xff],
        };
        let event = LoggedEvent::from_record(9, record, &log);
        let err = event.decode::<TaskEvent>().unwrap_err();
        assert!(matches!(err, KernelError::Decode { position: 9, .. }));
    }
}
