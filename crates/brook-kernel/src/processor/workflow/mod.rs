//! The workflow instance processor.
//!
//! Every accepted intent maps to one [`Handler`]. Handlers are plain
//! functions over the read-only [`WorkflowState`] and the mutable
//! [`WorkflowRuntime`] (caches only); all state changes travel back as
//! [`WorkflowUpdate`]s and are applied after the records are written.

mod handlers;

use std::sync::Arc;

use brook_mapping::PayloadMappingProcessor;

use crate::cache::WorkflowCache;
use crate::config::KernelConfig;
use crate::definition::{CompiledWorkflow, WorkflowTransformer};
use crate::error::KernelError;
use crate::event::{
    DeploymentEventType, Intent, LoggedEvent, TaskEventType, WorkflowInstanceEventType,
};
use crate::journal::LogPosition;
use crate::processor::{EventProcessor, KeyRef, ProcessingContext, Transition};
use crate::snapshot::{ComposedSnapshot, SnapshotSupport};
use crate::state::{
    ActivityInstanceIndex, PayloadCache, WorkflowDefinitionKey, WorkflowInstanceIndex,
    WorkflowPositionIndex, WorkflowVersionIndex,
};

const VERSIONS_PART: &str = "workflow/versions";
const POSITIONS_PART: &str = "workflow/positions";
const INSTANCES_PART: &str = "workflow/instances";
const ACTIVITIES_PART: &str = "workflow/activities";
const PAYLOADS_PART: &str = "workflow/payloads";

/// Indexes that survive restarts through snapshots.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub versions: WorkflowVersionIndex,
    pub positions: WorkflowPositionIndex,
    pub instances: WorkflowInstanceIndex,
    pub activities: ActivityInstanceIndex,
    pub payloads: PayloadCache,
}

/// Derived, rebuildable helpers.
pub struct WorkflowRuntime {
    pub workflows: WorkflowCache,
    pub mapping: PayloadMappingProcessor,
    transformer: Arc<dyn WorkflowTransformer>,
}

impl WorkflowRuntime {
    pub fn new(transformer: Arc<dyn WorkflowTransformer>, config: &KernelConfig) -> Self {
        Self {
            workflows: WorkflowCache::new(config.workflow_cache_size),
            mapping: PayloadMappingProcessor::with_max_payload_size(config.max_payload_size),
            transformer,
        }
    }

    pub fn workflow(
        &mut self,
        state: &WorkflowState,
        bpmn_process_id: &str,
        version: i32,
        context: &ProcessingContext<'_>,
    ) -> Result<Arc<CompiledWorkflow>, KernelError> {
        let key = WorkflowDefinitionKey::new(bpmn_process_id, version);
        let position = state
            .positions
            .get(&key)
            .ok_or_else(|| KernelError::WorkflowNotFound {
                bpmn_process_id: bpmn_process_id.to_string(),
                version,
            })?;
        self.workflows
            .workflow(&key, position, context, self.transformer.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowUpdate {
    WorkflowDeployed {
        bpmn_process_id: String,
        version: i32,
        position: LogPosition,
    },
    InstanceCreated {
        workflow_instance_key: i64,
        position: LogPosition,
    },
    SetActivityInstance {
        workflow_instance_key: i64,
        activity_instance_key: KeyRef,
    },
    ActivityInstanceCreated {
        activity_instance_key: KeyRef,
        activity_id: String,
    },
    SetTaskKey {
        activity_instance_key: i64,
        task_key: KeyRef,
    },
    RemoveActivityInstance {
        activity_instance_key: i64,
    },
    CachePayload {
        workflow_instance_key: i64,
        position: KeyRef,
        payload: Vec<u8>,
    },
    ConsumeToken {
        workflow_instance_key: i64,
    },
    RemoveInstance {
        workflow_instance_key: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    DeploymentCreated,
    CreateInstance,
    InstanceCreated,
    /// Start event, end event or completed activity: routed by the element's aspect.
    Aspect,
    SequenceFlowTaken,
    ActivityReady,
    ActivityActivated,
    ActivityCompleting,
    TaskCompleted,
    CancelInstance,
    UpdatePayload,
}

impl Handler {
    pub fn for_intent(intent: Intent) -> Option<Handler> {
        use WorkflowInstanceEventType as W;
        let handler = match intent {
            Intent::Deployment(DeploymentEventType::DeploymentCreated) => Handler::DeploymentCreated,
            Intent::WorkflowInstance(event_type) => match event_type {
                W::CreateWorkflowInstance => Handler::CreateInstance,
                W::WorkflowInstanceCreated => Handler::InstanceCreated,
                W::StartEventOccurred | W::EndEventOccurred | W::ActivityCompleted => {
                    Handler::Aspect
                }
                W::SequenceFlowTaken => Handler::SequenceFlowTaken,
                W::ActivityReady => Handler::ActivityReady,
                W::ActivityActivated => Handler::ActivityActivated,
                W::ActivityCompleting => Handler::ActivityCompleting,
                W::CancelWorkflowInstance => Handler::CancelInstance,
                W::UpdatePayload => Handler::UpdatePayload,
                _ => return None,
            },
            Intent::Task(TaskEventType::Completed) => Handler::TaskCompleted,
            _ => return None,
        };
        Some(handler)
    }

    /// Handlers that only act while the instance still holds tokens.
    pub fn requires_live_instance(&self) -> bool {
        matches!(
            self,
            Handler::Aspect
                | Handler::SequenceFlowTaken
                | Handler::ActivityReady
                | Handler::ActivityActivated
                | Handler::ActivityCompleting
        )
    }
}

pub struct WorkflowInstanceProcessor {
    state: WorkflowState,
    runtime: WorkflowRuntime,
}

impl WorkflowInstanceProcessor {
    pub fn new(transformer: Arc<dyn WorkflowTransformer>, config: &KernelConfig) -> Self {
        Self {
            state: WorkflowState::default(),
            runtime: WorkflowRuntime::new(transformer, config),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }
}

impl EventProcessor for WorkflowInstanceProcessor {
    type Update = WorkflowUpdate;

    fn accepts(&self, intent: Intent) -> bool {
        Handler::for_intent(intent).is_some()
    }

    fn process_event(
        &mut self,
        event: &LoggedEvent,
        context: &ProcessingContext<'_>,
    ) -> Result<Transition<WorkflowUpdate>, KernelError> {
        let Some(handler) = Handler::for_intent(event.intent()) else {
            return Ok(Transition::none());
        };
        log::debug!(
            "processing {:?} at position {} with {handler:?}",
            event.intent(),
            event.position
        );
        handlers::handle(handler, &self.state, &mut self.runtime, context, event)
    }

    fn update_state(
        &mut self,
        updates: Vec<WorkflowUpdate>,
        written: &[LogPosition],
    ) -> Result<(), KernelError> {
        let state = &mut self.state;
        for update in updates {
            match update {
                WorkflowUpdate::WorkflowDeployed {
                    bpmn_process_id,
                    version,
                    position,
                } => {
                    state.versions.put(&bpmn_process_id, version);
                    state
                        .positions
                        .put(WorkflowDefinitionKey::new(&bpmn_process_id, version), position);
                }
                WorkflowUpdate::InstanceCreated {
                    workflow_instance_key,
                    position,
                } => state.instances.new_instance(workflow_instance_key, position),
                WorkflowUpdate::SetActivityInstance {
                    workflow_instance_key,
                    activity_instance_key,
                } => state.instances.set_activity_instance(
                    workflow_instance_key,
                    activity_instance_key.resolve(written)?,
                ),
                WorkflowUpdate::ActivityInstanceCreated {
                    activity_instance_key,
                    activity_id,
                } => state
                    .activities
                    .new_activity_instance(activity_instance_key.resolve(written)?, &activity_id),
                WorkflowUpdate::SetTaskKey {
                    activity_instance_key,
                    task_key,
                } => state
                    .activities
                    .set_task_key(activity_instance_key, task_key.resolve(written)?),
                WorkflowUpdate::RemoveActivityInstance {
                    activity_instance_key,
                } => {
                    state.activities.remove(activity_instance_key);
                }
                WorkflowUpdate::CachePayload {
                    workflow_instance_key,
                    position,
                    payload,
                } => state
                    .payloads
                    .put(workflow_instance_key, position.resolve(written)?, payload),
                WorkflowUpdate::ConsumeToken {
                    workflow_instance_key,
                } => {
                    state.instances.consume_token(workflow_instance_key);
                }
                WorkflowUpdate::RemoveInstance {
                    workflow_instance_key,
                } => {
                    state.instances.remove(workflow_instance_key);
                    state.payloads.remove(workflow_instance_key);
                }
            }
        }
        Ok(())
    }
}

impl SnapshotSupport for WorkflowInstanceProcessor {
    fn write_snapshot(&self, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        self.state.versions.write_part(VERSIONS_PART, snapshot)?;
        self.state.positions.write_part(POSITIONS_PART, snapshot)?;
        self.state.instances.write_part(INSTANCES_PART, snapshot)?;
        self.state.activities.write_part(ACTIVITIES_PART, snapshot)?;
        self.state.payloads.write_part(PAYLOADS_PART, snapshot)
    }

    fn recover_from_snapshot(&mut self, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.state.versions.recover_part(VERSIONS_PART, snapshot)?;
        self.state.positions.recover_part(POSITIONS_PART, snapshot)?;
        self.state.instances.recover_part(INSTANCES_PART, snapshot)?;
        self.state.activities.recover_part(ACTIVITIES_PART, snapshot)?;
        self.state.payloads.recover_part(PAYLOADS_PART, snapshot)
    }

    fn reset(&mut self) {
        self.state.versions.clear();
        self.state.positions.clear();
        self.state.instances.clear();
        self.state.activities.clear();
        self.state.payloads.clear();
        self.runtime.workflows.clear();
    }
}
