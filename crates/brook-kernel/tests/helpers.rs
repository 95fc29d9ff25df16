//! Shared helpers for the kernel integration tests.
//!
//! Each test file compiles this module on its own, so some helpers look
//! unused from a single file's point of view.

#![allow(dead_code)]

use std::sync::Arc;

use brook_kernel::event::{EventValue, Intent};
use brook_kernel::{
    Command, KernelConfig, LogPosition, LoggedEvent, MemJournal, MemResponseSink, Response,
    StreamProcessorBuilder, StreamProcessorController, TaskEvent, TaskEventType,
    WorkflowInstanceEvent, WorkflowInstanceEventType,
};
use brook_store::MemStore;
use serde_json::{Value, json};

pub type Controller = StreamProcessorController<MemStore>;

pub fn cbor(value: &Value) -> Vec<u8> {
    serde_cbor::to_vec(value).expect("encode payload")
}

pub fn from_cbor(bytes: &[u8]) -> Value {
    serde_cbor::from_slice(bytes).expect("decode payload")
}

/// start -> service task `task` -> end, with the given mappings on the task.
pub fn service_task_process(process_id: &str, io_mapping: Value) -> Value {
    json!({"id": process_id, "elements": [
        {"type": "startEvent", "id": "start"},
        {"type": "sequenceFlow", "id": "to-task", "source": "start", "target": "task"},
        {"type": "serviceTask", "id": "task", "taskType": "work", "retries": 5,
         "headers": {"owner": "billing"}, "ioMapping": io_mapping},
        {"type": "sequenceFlow", "id": "to-end", "source": "task", "target": "end"},
        {"type": "endEvent", "id": "end"}
    ]})
}

pub fn resource(processes: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&json!({ "processes": processes })).expect("encode resource")
}

pub fn simple_resource(process_id: &str) -> Vec<u8> {
    resource(&[service_task_process(process_id, json!({}))])
}

pub struct Harness {
    pub journal: MemJournal,
    pub store: Arc<MemStore>,
    pub responses: MemResponseSink,
    pub controller: Controller,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let journal = MemJournal::new();
        let store = Arc::new(MemStore::new());
        let responses = MemResponseSink::new();
        let controller = StreamProcessorBuilder::new(Arc::clone(&store))
            .with_journal(Box::new(journal.clone()))
            .with_responses(Box::new(responses.clone()))
            .with_config(config)
            .open()
            .expect("open controller");
        Self {
            journal,
            store,
            responses,
            controller,
        }
    }

    /// A second controller over the same log and store.
    pub fn reopen(&self, config: KernelConfig) -> Controller {
        StreamProcessorBuilder::new(Arc::clone(&self.store))
            .with_journal(Box::new(self.journal.clone()))
            .with_config(config)
            .open()
            .expect("reopen controller")
    }

    /// Submits `command`, processes the log and returns the command's response.
    pub fn execute(&mut self, command: Command) -> (LogPosition, Response) {
        let position = self.controller.submit(command).expect("submit command");
        self.controller
            .process_available()
            .expect("process log");
        let response = self
            .responses
            .take()
            .into_iter()
            .find(|response| response.request.request_id == position as u64)
            .expect("response for command");
        (position, response)
    }

    pub fn deploy(&mut self, resource: Vec<u8>) -> Response {
        self.execute(Command::deploy(resource).unwrap()).1
    }

    /// Creates an instance of the latest version.
    pub fn create(&mut self, process_id: &str, payload: Option<Value>) -> Response {
        let payload = payload.as_ref().map(cbor).unwrap_or_default();
        self.execute(Command::create_instance(process_id, None, payload).unwrap())
            .1
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.controller.events_from(0).expect("read log")
    }

    pub fn intents_from(&self, from: LogPosition) -> Vec<Intent> {
        self.controller
            .events_from(from)
            .expect("read log")
            .iter()
            .map(LoggedEvent::intent)
            .collect()
    }

    /// The latest event of `event_type` that belongs to `workflow_instance_key`.
    pub fn last_instance_event(
        &self,
        workflow_instance_key: i64,
        event_type: WorkflowInstanceEventType,
    ) -> Option<(LoggedEvent, WorkflowInstanceEvent)> {
        self.events()
            .into_iter()
            .filter(|event| event.intent() == Intent::WorkflowInstance(event_type))
            .map(|event| {
                let value: WorkflowInstanceEvent = event.decode().unwrap();
                (event, value)
            })
            .filter(|(_, value)| value.workflow_instance_key == workflow_instance_key)
            .last()
    }

    /// The task created for the instance's current activity.
    pub fn open_task(&self, workflow_instance_key: i64) -> (i64, TaskEvent) {
        self.events()
            .into_iter()
            .filter(|event| event.intent() == Intent::Task(TaskEventType::Create))
            .map(|event| {
                let task: TaskEvent = event.decode().unwrap();
                (event.key, task)
            })
            .filter(|(_, task)| task.headers.workflow_instance_key == workflow_instance_key)
            .last()
            .expect("task for instance")
    }

    pub fn complete(&mut self, workflow_instance_key: i64, payload: Option<Value>) -> LogPosition {
        let (task_key, task) = self.open_task(workflow_instance_key);
        let payload = payload.as_ref().map(cbor).unwrap_or_default();
        let command = Command::complete_task(task_key, &task, payload).unwrap();
        let position = self.controller.submit(command).expect("submit completion");
        self.controller.process_available().expect("process log");
        position
    }

    pub fn assert_instance_gone(&self, workflow_instance_key: i64) {
        let state = self.controller.workflow_state();
        assert!(state.instances.get(workflow_instance_key).is_none());
        assert!(state.payloads.get(workflow_instance_key).is_none());
    }
}

pub fn decode<T: EventValue>(response: &Response) -> T {
    response.decode().expect("decode response value")
}
