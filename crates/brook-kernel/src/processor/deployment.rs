use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::WorkflowTransformer;
use crate::error::KernelError;
use crate::event::{DeployedWorkflow, DeploymentEvent, DeploymentEventType, Intent, LoggedEvent};
use crate::journal::LogPosition;
use crate::processor::{EventProcessor, ProcessingContext, RecordKey, Transition};
use crate::snapshot::{ComposedSnapshot, SnapshotSupport};
use crate::state::WorkflowVersionIndex;

const VERSIONS_PART: &str = "deployment/versions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentUpdate {
    VersionAssigned { bpmn_process_id: String, version: i32 },
}

/// Validates deployments and assigns workflow versions.
pub struct DeploymentProcessor {
    versions: WorkflowVersionIndex,
    transformer: Arc<dyn WorkflowTransformer>,
}

impl DeploymentProcessor {
    pub fn new(transformer: Arc<dyn WorkflowTransformer>) -> Self {
        Self {
            versions: WorkflowVersionIndex::default(),
            transformer,
        }
    }

    pub fn versions(&self) -> &WorkflowVersionIndex {
        &self.versions
    }
}

impl EventProcessor for DeploymentProcessor {
    type Update = DeploymentUpdate;

    fn accepts(&self, intent: Intent) -> bool {
        intent == Intent::Deployment(DeploymentEventType::CreateDeployment)
    }

    fn process_event(
        &mut self,
        event: &LoggedEvent,
        _context: &ProcessingContext<'_>,
    ) -> Result<Transition<DeploymentUpdate>, KernelError> {
        let command: DeploymentEvent = event.decode()?;
        let mut transition = Transition::none();

        let workflows = match self.transformer.transform(&command.resource) {
            Ok(workflows) => workflows,
            Err(err) => {
                log::info!("rejected deployment at position {}: {err}", event.position);
                let rejected = DeploymentEvent {
                    event_type: DeploymentEventType::DeploymentRejected,
                    error_message: err.to_string(),
                    ..command
                };
                let record = transition.write(RecordKey::Explicit(event.key), &rejected)?;
                transition.respond(record);
                return Ok(transition);
            }
        };

        // Versions assigned earlier in this deployment are not in the index yet.
        let mut assigned: HashMap<&str, i32> = HashMap::new();
        let mut deployed = Vec::with_capacity(workflows.len());
        for workflow in &workflows {
            let id = workflow.bpmn_process_id.as_str();
            let version = assigned
                .get(id)
                .map(|version| version + 1)
                .unwrap_or_else(|| self.versions.next_version(id));
            assigned.insert(id, version);
            deployed.push(DeployedWorkflow {
                bpmn_process_id: id.to_string(),
                version,
            });
            transition.update(DeploymentUpdate::VersionAssigned {
                bpmn_process_id: id.to_string(),
                version,
            });
        }

        let created = DeploymentEvent {
            event_type: DeploymentEventType::DeploymentCreated,
            resource: command.resource,
            deployed_workflows: deployed,
            error_message: String::new(),
        };
        let record = transition.write(RecordKey::Explicit(event.key), &created)?;
        transition.respond(record);
        Ok(transition)
    }

    fn update_state(
        &mut self,
        updates: Vec<DeploymentUpdate>,
        _written: &[LogPosition],
    ) -> Result<(), KernelError> {
        for update in updates {
            match update {
                DeploymentUpdate::VersionAssigned {
                    bpmn_process_id,
                    version,
                } => {
                    log::info!("deployed workflow '{bpmn_process_id}' version {version}");
                    self.versions.put(&bpmn_process_id, version);
                }
            }
        }
        Ok(())
    }
}

impl SnapshotSupport for DeploymentProcessor {
    fn write_snapshot(&self, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        self.versions.write_part(VERSIONS_PART, snapshot)
    }

    fn recover_from_snapshot(&mut self, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.versions.recover_part(VERSIONS_PART, snapshot)
    }

    fn reset(&mut self) {
        self.versions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::JsonWorkflowTransformer;
    use crate::processor::testing::{EventLog, log_id};
    use serde_json::json;

    fn resource(process_ids: &[&str]) -> Vec<u8> {
        let processes: Vec<_> = process_ids
            .iter()
            .map(|id| {
                json!({"id": id, "elements": [
                    {"type": "startEvent", "id": "start"},
                    {"type": "sequenceFlow", "id": "f1", "source": "start", "target": "end"},
                    {"type": "endEvent", "id": "end"}
                ]})
            })
            .collect();
        serde_json::to_vec(&json!({ "processes": processes })).unwrap()
    }

    fn deploy(
        processor: &mut DeploymentProcessor,
        log: &mut EventLog,
        position: LogPosition,
        resource: Vec<u8>,
    ) -> DeploymentEvent {
        let event = log.event(position, position, &DeploymentEvent::create(resource));
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &*log);
        let transition = processor.process_event(&event, &context).unwrap();
        assert_eq!(transition.records.len(), 1);
        assert_eq!(transition.records[0].key, RecordKey::Explicit(position));
        assert_eq!(transition.response.map(|r| r.record), Some(0));
        let value = serde_cbor::from_slice(&transition.records[0].value).unwrap();
        processor
            .update_state(transition.updates, &[position + 1])
            .unwrap();
        value
    }

    #[test]
    fn versions_increase_per_process() {
        let mut processor = DeploymentProcessor::new(Arc::new(JsonWorkflowTransformer));
        let mut log = EventLog::default();
        for (position, expected) in [(0, 1), (2, 2), (4, 3)] {
            let created = deploy(&mut processor, &mut log, position, resource(&["order"]));
            assert_eq!(created.event_type, DeploymentEventType::DeploymentCreated);
            assert_eq!(created.deployed_workflows[0].version, expected);
        }
        assert_eq!(processor.versions().latest("order"), Some(3));
    }

    #[test]
    fn duplicate_ids_in_one_deployment_get_consecutive_versions() {
        let mut processor = DeploymentProcessor::new(Arc::new(JsonWorkflowTransformer));
        let mut log = EventLog::default();
        let created = deploy(&mut processor, &mut log, 0, resource(&["a", "a", "b"]));
        let versions: Vec<_> = created
            .deployed_workflows
            .iter()
            .map(|w| (w.bpmn_process_id.as_str(), w.version))
            .collect();
        assert_eq!(versions, vec![("a", 1), ("a", 2), ("b", 1)]);
        assert_eq!(processor.versions().latest("a"), Some(2));
    }

    #[test]
    fn invalid_resource_is_rejected_without_state_change() {
        let mut processor = DeploymentProcessor::new(Arc::new(JsonWorkflowTransformer));
        let mut log = EventLog::default();
        let rejected = deploy(&mut processor, &mut log, 0, b"not json".to_vec());
        assert_eq!(rejected.event_type, DeploymentEventType::DeploymentRejected);
        assert!(rejected.error_message.starts_with("failed to read process definition"));
        assert_eq!(processor.versions().len(), 0);
    }
}
