use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::definition::{CompiledWorkflow, WorkflowTransformer};
use crate::error::KernelError;
use crate::event::{DeployedWorkflow, DeploymentEvent, DeploymentEventType, Intent};
use crate::journal::LogPosition;
use crate::processor::ProcessingContext;
use crate::state::WorkflowDefinitionKey;

type Deployment = Vec<(DeployedWorkflow, Arc<CompiledWorkflow>)>;

/// Compiled workflows by the position of their `DEPLOYMENT_CREATED` event.
///
/// Least recently used deployments are evicted once `capacity` is reached; a
/// miss reads the deployment back from the log and transforms it again.
pub struct WorkflowCache {
    capacity: usize,
    map: HashMap<LogPosition, Deployment>,
    order: VecDeque<LogPosition>,
}

impl WorkflowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, position: LogPosition) -> bool {
        self.map.contains_key(&position)
    }

    pub fn workflow(
        &mut self,
        key: &WorkflowDefinitionKey,
        position: LogPosition,
        context: &ProcessingContext<'_>,
        transformer: &dyn WorkflowTransformer,
    ) -> Result<Arc<CompiledWorkflow>, KernelError> {
        if self.map.contains_key(&position) {
            self.promote(position);
        } else {
            let deployment = load_deployment(position, context, transformer)?;
            self.insert(position, deployment);
        }
        self.map
            .get(&position)
            .and_then(|deployment| {
                deployment.iter().find(|(deployed, _)| {
                    deployed.bpmn_process_id == key.bpmn_process_id && deployed.version == key.version
                })
            })
            .map(|(_, workflow)| Arc::clone(workflow))
            .ok_or_else(|| KernelError::WorkflowNotFound {
                bpmn_process_id: key.bpmn_process_id.clone(),
                version: key.version,
            })
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    fn insert(&mut self, position: LogPosition, deployment: Deployment) {
        if self.capacity > 0 && self.map.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        self.order.push_back(position);
        self.map.insert(position, deployment);
    }

    fn promote(&mut self, position: LogPosition) {
        self.order.retain(|p| *p != position);
        self.order.push_back(position);
    }
}

fn load_deployment(
    position: LogPosition,
    context: &ProcessingContext<'_>,
    transformer: &dyn WorkflowTransformer,
) -> Result<Deployment, KernelError> {
    let event = context.read_event(position)?.ok_or_else(|| {
        KernelError::IllegalState(format!("no deployment found at log position {position}"))
    })?;
    if event.intent() != Intent::Deployment(DeploymentEventType::DeploymentCreated) {
        return Err(KernelError::IllegalState(format!(
            "expected a created deployment at log position {position}, found {:?}",
            event.intent()
        )));
    }
    let deployment: DeploymentEvent = event.decode()?;
    let workflows = transformer.transform(&deployment.resource).map_err(|err| {
        KernelError::IllegalState(format!(
            "deployment at log position {position} no longer transforms: {err}"
        ))
    })?;
    if workflows.len() != deployment.deployed_workflows.len() {
        return Err(KernelError::IllegalState(format!(
            "deployment at log position {position} lists {} workflows but transforms into {}",
            deployment.deployed_workflows.len(),
            workflows.len()
        )));
    }
    log::debug!("loaded deployment at position {position} into the workflow cache");
    Ok(deployment
        .deployed_workflows
        .into_iter()
        .zip(workflows.into_iter().map(Arc::new))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::JsonWorkflowTransformer;
    use crate::processor::testing::{EventLog, log_id};

    fn resource(process_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({"processes": [{"id": process_id, "elements": [
            {"type": "startEvent", "id": "start"},
            {"type": "sequenceFlow", "id": "f1", "source": "start", "target": "end"},
            {"type": "endEvent", "id": "end"}
        ]}]}))
        .unwrap()
    }

    fn deployed(log: &mut EventLog, position: LogPosition, process_id: &str, version: i32) {
        let event = DeploymentEvent {
            event_type: DeploymentEventType::DeploymentCreated,
            resource: resource(process_id),
            deployed_workflows: vec![DeployedWorkflow {
                bpmn_process_id: process_id.into(),
                version,
            }],
            error_message: String::new(),
        };
        log.event(position, position, &event);
    }

    #[test]
    fn loads_on_miss_and_evicts_least_recently_used() {
        let mut log = EventLog::default();
        deployed(&mut log, 1, "a", 1);
        deployed(&mut log, 2, "b", 1);
        deployed(&mut log, 3, "c", 1);
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);
        let transformer = JsonWorkflowTransformer;

        let mut cache = WorkflowCache::new(2);
        let a = WorkflowDefinitionKey::new("a", 1);
        let b = WorkflowDefinitionKey::new("b", 1);
        let c = WorkflowDefinitionKey::new("c", 1);
        cache.workflow(&a, 1, &context, &transformer).unwrap();
        cache.workflow(&b, 2, &context, &transformer).unwrap();
        cache.workflow(&a, 1, &context, &transformer).unwrap();
        let workflow = cache.workflow(&c, 3, &context, &transformer).unwrap();
        assert_eq!(workflow.bpmn_process_id, "c");
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
    }

    #[test]
    fn wrong_position_is_an_illegal_state() {
        let log = EventLog::default();
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);
        let mut cache = WorkflowCache::new(4);
        let err = cache
            .workflow(
                &WorkflowDefinitionKey::new("a", 1),
                7,
                &context,
                &JsonWorkflowTransformer,
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::IllegalState(_)));
    }
}
