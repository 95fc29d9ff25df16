use crate::error::KernelError;
use crate::event::{
    DeploymentEvent, EventValue, Intent, NO_KEY, TaskEvent, WorkflowInstanceEvent,
    WorkflowInstanceEventType,
};
use crate::processor::RecordKey;

/// A client command as it is written to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub key: RecordKey,
    pub intent: Intent,
    pub value: Vec<u8>,
}

impl Command {
    pub fn new<V: EventValue>(key: RecordKey, value: &V) -> Result<Self, KernelError> {
        Ok(Self {
            key,
            intent: value.intent(),
            value: value.encode()?,
        })
    }

    pub fn deploy(resource: Vec<u8>) -> Result<Self, KernelError> {
        Self::new(RecordKey::Position, &DeploymentEvent::create(resource))
    }

    /// `version: None` starts the latest deployed version.
    pub fn create_instance(
        bpmn_process_id: &str,
        version: Option<i32>,
        payload: Vec<u8>,
    ) -> Result<Self, KernelError> {
        Self::new(
            RecordKey::Position,
            &WorkflowInstanceEvent::create(bpmn_process_id, version, payload),
        )
    }

    pub fn cancel_instance(workflow_instance_key: i64) -> Result<Self, KernelError> {
        let value = WorkflowInstanceEvent {
            event_type: WorkflowInstanceEventType::CancelWorkflowInstance,
            workflow_instance_key,
            ..WorkflowInstanceEvent::create("", None, Vec::new())
        };
        Self::new(RecordKey::Explicit(workflow_instance_key), &value)
    }

    pub fn update_payload(
        activity_instance_key: i64,
        workflow_instance_key: i64,
        payload: Vec<u8>,
    ) -> Result<Self, KernelError> {
        let value = WorkflowInstanceEvent {
            event_type: WorkflowInstanceEventType::UpdatePayload,
            workflow_instance_key,
            ..WorkflowInstanceEvent::create("", None, payload)
        };
        Self::new(RecordKey::Explicit(activity_instance_key), &value)
    }

    /// Completion of the task created at `task_key`, as a worker reports it.
    pub fn complete_task(task_key: i64, task: &TaskEvent, payload: Vec<u8>) -> Result<Self, KernelError> {
        if task_key == NO_KEY {
            return Err(KernelError::IllegalState("cannot complete a task without key".into()));
        }
        Self::new(RecordKey::Explicit(task_key), &task.completed(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WorkflowInstanceEventType as W;

    #[test]
    fn command_keys() {
        let create = Command::create_instance("order", Some(2), Vec::new()).unwrap();
        assert_eq!(create.key, RecordKey::Position);
        assert_eq!(create.intent, Intent::WorkflowInstance(W::CreateWorkflowInstance));

        let cancel = Command::cancel_instance(7).unwrap();
        assert_eq!(cancel.key, RecordKey::Explicit(7));
        let value: WorkflowInstanceEvent = serde_cbor::from_slice(&cancel.value).unwrap();
        assert_eq!(value.workflow_instance_key, 7);

        let update = Command::update_payload(12, 7, vec![0xa0]).unwrap();
        assert_eq!(update.key, RecordKey::Explicit(12));
        assert_eq!(update.intent, Intent::WorkflowInstance(W::UpdatePayload));

        let deploy = Command::deploy(b"{}".to_vec()).unwrap();
        assert!(matches!(deploy.intent, Intent::Deployment(_)));
    }
}
