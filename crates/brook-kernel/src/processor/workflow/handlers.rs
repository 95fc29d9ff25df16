use std::sync::Arc;

use brook_cbor::{EMPTY_MAP, is_absent, validate_document};

use super::{Handler, WorkflowRuntime, WorkflowState, WorkflowUpdate};
use crate::definition::{BpmnAspect, CompiledWorkflow, ElementKind, FlowElement};
use crate::error::KernelError;
use crate::event::{
    DeploymentEvent, Intent, LATEST_VERSION, LoggedEvent, NO_KEY, TaskEvent, TaskEventType,
    TaskHeaders, WorkflowInstanceEvent, WorkflowInstanceEventType as W,
};
use crate::processor::{KeyRef, ProcessingContext, RecordKey, Transition};
use crate::state::WorkflowDefinitionKey;

type Result<T> = std::result::Result<T, KernelError>;
type WorkflowTransition = Transition<WorkflowUpdate>;

pub(super) fn handle(
    handler: Handler,
    state: &WorkflowState,
    runtime: &mut WorkflowRuntime,
    context: &ProcessingContext<'_>,
    event: &LoggedEvent,
) -> Result<WorkflowTransition> {
    if handler.requires_live_instance() {
        let Some(step) = Step::live(state, runtime, context, event)? else {
            return Ok(Transition::none());
        };
        return match handler {
            Handler::Aspect => aspect(state, &step),
            Handler::SequenceFlowTaken => sequence_flow_taken(&step),
            Handler::ActivityReady => activity_ready(runtime, &step),
            Handler::ActivityActivated => activity_activated(&step),
            Handler::ActivityCompleting => activity_completing(state, runtime, &step),
            other => Err(KernelError::IllegalState(format!(
                "{other:?} does not operate on a live instance"
            ))),
        };
    }
    match handler {
        Handler::DeploymentCreated => deployment_created(event),
        Handler::CreateInstance => create_instance(state, event),
        Handler::InstanceCreated => instance_created(state, runtime, context, event),
        Handler::TaskCompleted => task_completed(state, event),
        Handler::CancelInstance => cancel_instance(state, context, event),
        Handler::UpdatePayload => update_payload(state, event),
        other => Err(KernelError::IllegalState(format!(
            "{other:?} requires a live instance"
        ))),
    }
}

/// A workflow instance event of an instance that still holds tokens.
struct Step<'a> {
    event: &'a LoggedEvent,
    value: WorkflowInstanceEvent,
    workflow: Arc<CompiledWorkflow>,
}

impl<'a> Step<'a> {
    fn live(
        state: &WorkflowState,
        runtime: &mut WorkflowRuntime,
        context: &ProcessingContext<'_>,
        event: &'a LoggedEvent,
    ) -> Result<Option<Self>> {
        let value: WorkflowInstanceEvent = event.decode()?;
        if !state.instances.is_active(value.workflow_instance_key) {
            log::debug!(
                "workflow instance {} is not active, skipping {:?} at position {}",
                value.workflow_instance_key,
                event.intent(),
                event.position
            );
            return Ok(None);
        }
        let workflow = runtime.workflow(state, &value.bpmn_process_id, value.version, context)?;
        Ok(Some(Self {
            event,
            value,
            workflow,
        }))
    }

    fn element(&self) -> Result<&FlowElement> {
        element(&self.workflow, &self.value.activity_id)
    }
}

fn element<'w>(workflow: &'w CompiledWorkflow, id: &str) -> Result<&'w FlowElement> {
    workflow.element(id).ok_or_else(|| {
        KernelError::IllegalState(format!(
            "workflow '{}' has no element '{id}'",
            workflow.bpmn_process_id
        ))
    })
}

fn unsupported(element: &FlowElement) -> KernelError {
    KernelError::UnsupportedActivity {
        activity_id: element.id.clone(),
        kind: element.kind.name().to_string(),
    }
}

fn well_formed_payload(payload: &[u8]) -> Option<Vec<u8>> {
    if is_absent(payload) {
        return Some(EMPTY_MAP.to_vec());
    }
    validate_document(payload).ok().map(|_| payload.to_vec())
}

fn deployment_created(event: &LoggedEvent) -> Result<WorkflowTransition> {
    let deployment: DeploymentEvent = event.decode()?;
    let mut transition = Transition::none();
    for deployed in deployment.deployed_workflows {
        transition.update(WorkflowUpdate::WorkflowDeployed {
            bpmn_process_id: deployed.bpmn_process_id,
            version: deployed.version,
            position: event.position,
        });
    }
    Ok(transition)
}

fn create_instance(state: &WorkflowState, event: &LoggedEvent) -> Result<WorkflowTransition> {
    let command: WorkflowInstanceEvent = event.decode()?;
    let version = if command.version == LATEST_VERSION {
        state.versions.latest(&command.bpmn_process_id)
    } else {
        Some(command.version)
    };
    let deployed = version.filter(|version| {
        state
            .positions
            .get(&WorkflowDefinitionKey::new(&command.bpmn_process_id, *version))
            .is_some()
    });
    let payload = well_formed_payload(&command.payload);

    let mut transition = Transition::none();
    let record = match (deployed, payload) {
        (Some(version), Some(payload)) => {
            let created = WorkflowInstanceEvent {
                event_type: W::WorkflowInstanceCreated,
                version,
                workflow_instance_key: event.key,
                activity_id: command.bpmn_process_id.clone(),
                payload,
                ..command
            };
            transition.write(RecordKey::Explicit(event.key), &created)?
        }
        (deployed, _) => {
            if deployed.is_none() {
                log::info!(
                    "rejecting instance of '{}' version {}: workflow is not deployed",
                    command.bpmn_process_id,
                    command.version
                );
            } else {
                log::info!(
                    "rejecting instance of '{}': payload is not a valid document",
                    command.bpmn_process_id
                );
            }
            let rejected = WorkflowInstanceEvent {
                event_type: W::WorkflowInstanceRejected,
                workflow_instance_key: event.key,
                ..command
            };
            transition.write(RecordKey::Explicit(event.key), &rejected)?
        }
    };
    transition.respond(record);
    Ok(transition)
}

fn instance_created(
    state: &WorkflowState,
    runtime: &mut WorkflowRuntime,
    context: &ProcessingContext<'_>,
    event: &LoggedEvent,
) -> Result<WorkflowTransition> {
    let value: WorkflowInstanceEvent = event.decode()?;
    let workflow = runtime.workflow(state, &value.bpmn_process_id, value.version, context)?;
    let start = workflow.scope_start_event().ok_or_else(|| {
        KernelError::IllegalState(format!(
            "workflow '{}' has no start event",
            workflow.bpmn_process_id
        ))
    })?;

    let mut transition = Transition::none();
    transition.write(
        RecordKey::Position,
        &value.next_at(W::StartEventOccurred, &start.id),
    )?;
    transition.update(WorkflowUpdate::InstanceCreated {
        workflow_instance_key: value.workflow_instance_key,
        position: event.position,
    });
    Ok(transition)
}

fn aspect(state: &WorkflowState, step: &Step<'_>) -> Result<WorkflowTransition> {
    let element = step.element()?;
    match element.aspect {
        BpmnAspect::TakeSequenceFlow => take_sequence_flow(step, element),
        BpmnAspect::ConsumeToken => consume_token(state, step),
        BpmnAspect::None => Err(unsupported(element)),
    }
}

fn take_sequence_flow(step: &Step<'_>, element: &FlowElement) -> Result<WorkflowTransition> {
    let flow = element.outgoing.first().ok_or_else(|| {
        KernelError::IllegalState(format!(
            "element '{}' has no outgoing sequence flow",
            element.id
        ))
    })?;
    let mut transition = Transition::none();
    transition.write(
        RecordKey::Position,
        &step.value.next_at(W::SequenceFlowTaken, flow),
    )?;
    Ok(transition)
}

fn consume_token(state: &WorkflowState, step: &Step<'_>) -> Result<WorkflowTransition> {
    let workflow_instance_key = step.value.workflow_instance_key;
    let entry = state.instances.get(workflow_instance_key).ok_or_else(|| {
        KernelError::IllegalState(format!("workflow instance {workflow_instance_key} is unknown"))
    })?;

    let mut transition = Transition::none();
    transition.update(WorkflowUpdate::ConsumeToken {
        workflow_instance_key,
    });
    if entry.active_token_count <= 1 {
        let completed = step
            .value
            .next_at(W::WorkflowInstanceCompleted, &step.value.bpmn_process_id);
        transition.write(RecordKey::Explicit(workflow_instance_key), &completed)?;
        transition.update(WorkflowUpdate::RemoveInstance {
            workflow_instance_key,
        });
    }
    Ok(transition)
}

fn sequence_flow_taken(step: &Step<'_>) -> Result<WorkflowTransition> {
    let flow = step.element()?;
    let target_id = flow.target.as_deref().ok_or_else(|| {
        KernelError::IllegalState(format!("sequence flow '{}' has no target", flow.id))
    })?;
    let target = element(&step.workflow, target_id)?;

    let mut transition = Transition::none();
    match target.kind {
        ElementKind::EndEvent => {
            transition.write(
                RecordKey::Position,
                &step.value.next_at(W::EndEventOccurred, target_id),
            )?;
        }
        ElementKind::ServiceTask => {
            let ready = transition.write(
                RecordKey::Position,
                &step.value.next_at(W::ActivityReady, target_id),
            )?;
            transition.update(WorkflowUpdate::SetActivityInstance {
                workflow_instance_key: step.value.workflow_instance_key,
                activity_instance_key: KeyRef::Written(ready),
            });
            transition.update(WorkflowUpdate::ActivityInstanceCreated {
                activity_instance_key: KeyRef::Written(ready),
                activity_id: target_id.to_string(),
            });
        }
        _ => return Err(unsupported(target)),
    }
    Ok(transition)
}

fn activity_ready(runtime: &mut WorkflowRuntime, step: &Step<'_>) -> Result<WorkflowTransition> {
    let element = step.element()?;
    if element.kind != ElementKind::ServiceTask {
        return Err(unsupported(element));
    }
    let payload = runtime
        .mapping
        .extract(&step.value.payload, &element.io_mapping.inputs)?;

    let mut transition = Transition::none();
    let activated = WorkflowInstanceEvent {
        payload,
        ..step.value.next(W::ActivityActivated)
    };
    transition.write(RecordKey::Explicit(step.event.key), &activated)?;
    transition.update(WorkflowUpdate::CachePayload {
        workflow_instance_key: step.value.workflow_instance_key,
        position: KeyRef::Known(step.event.position),
        payload: step.value.payload.clone(),
    });
    Ok(transition)
}

fn activity_activated(step: &Step<'_>) -> Result<WorkflowTransition> {
    let element = step.element()?;
    let task = element.task.as_ref().ok_or_else(|| unsupported(element))?;
    let value = &step.value;
    let create = TaskEvent {
        event_type: TaskEventType::Create,
        task_type: task.task_type.clone(),
        retries: task.retries,
        payload: value.payload.clone(),
        headers: TaskHeaders {
            bpmn_process_id: value.bpmn_process_id.clone(),
            workflow_definition_version: value.version,
            workflow_instance_key: value.workflow_instance_key,
            activity_id: value.activity_id.clone(),
            activity_instance_key: step.event.key,
            custom_headers: task.headers.clone(),
        },
    };

    let mut transition = Transition::none();
    let record = transition.write(RecordKey::Position, &create)?;
    transition.update(WorkflowUpdate::SetTaskKey {
        activity_instance_key: step.event.key,
        task_key: KeyRef::Written(record),
    });
    Ok(transition)
}

fn task_completed(state: &WorkflowState, event: &LoggedEvent) -> Result<WorkflowTransition> {
    let task: TaskEvent = event.decode()?;
    let headers = &task.headers;
    if !state
        .activities
        .has_open_task(headers.activity_instance_key, event.key)
        || !state.instances.is_active(headers.workflow_instance_key)
    {
        log::warn!(
            "ignoring completion of task {} at position {}: activity instance {} has no such open task",
            event.key,
            event.position,
            headers.activity_instance_key
        );
        return Ok(Transition::none());
    }

    let completing = WorkflowInstanceEvent {
        event_type: W::ActivityCompleting,
        bpmn_process_id: headers.bpmn_process_id.clone(),
        version: headers.workflow_definition_version,
        workflow_instance_key: headers.workflow_instance_key,
        activity_id: headers.activity_id.clone(),
        payload: task.payload.clone(),
    };
    let mut transition = Transition::none();
    transition.write(
        RecordKey::Explicit(headers.activity_instance_key),
        &completing,
    )?;
    transition.update(WorkflowUpdate::SetTaskKey {
        activity_instance_key: headers.activity_instance_key,
        task_key: KeyRef::Known(NO_KEY),
    });
    Ok(transition)
}

fn activity_completing(
    state: &WorkflowState,
    runtime: &mut WorkflowRuntime,
    step: &Step<'_>,
) -> Result<WorkflowTransition> {
    let element = step.element()?;
    let value = &step.value;
    let outputs = &element.io_mapping.outputs;
    if let Some(mapping) = outputs.first() {
        if is_absent(&value.payload) {
            return Err(KernelError::MissingPayload {
                activity_id: element.id.clone(),
                query: mapping.source().expression().to_string(),
            });
        }
    }
    let cached = state
        .payloads
        .get(value.workflow_instance_key)
        .ok_or_else(|| {
            KernelError::IllegalState(format!(
                "no payload cached for workflow instance {}",
                value.workflow_instance_key
            ))
        })?;
    let payload = runtime
        .mapping
        .merge(&value.payload, &cached.payload, outputs)?;

    let mut transition = Transition::none();
    let completed = WorkflowInstanceEvent {
        payload,
        ..value.next(W::ActivityCompleted)
    };
    transition.write(RecordKey::Explicit(step.event.key), &completed)?;
    transition.update(WorkflowUpdate::SetActivityInstance {
        workflow_instance_key: value.workflow_instance_key,
        activity_instance_key: KeyRef::Known(NO_KEY),
    });
    transition.update(WorkflowUpdate::RemoveActivityInstance {
        activity_instance_key: step.event.key,
    });
    Ok(transition)
}

fn cancel_instance(
    state: &WorkflowState,
    context: &ProcessingContext<'_>,
    event: &LoggedEvent,
) -> Result<WorkflowTransition> {
    let command: WorkflowInstanceEvent = event.decode()?;
    let workflow_instance_key = event.key;
    let mut transition = Transition::none();

    let Some(entry) = state
        .instances
        .get(workflow_instance_key)
        .filter(|entry| entry.active_token_count > 0)
        .copied()
    else {
        log::info!("rejecting cancel of inactive workflow instance {workflow_instance_key}");
        let rejected = WorkflowInstanceEvent {
            event_type: W::CancelWorkflowInstanceRejected,
            workflow_instance_key,
            ..command
        };
        let record = transition.write(RecordKey::Explicit(workflow_instance_key), &rejected)?;
        transition.respond(record);
        return Ok(transition);
    };

    let created: WorkflowInstanceEvent =
        read_value(context, entry.position, "workflow instance", |intent| {
            matches!(intent, Intent::WorkflowInstance(_))
        })?;

    let activity_instance_key = entry.activity_instance_key;
    if activity_instance_key != NO_KEY {
        let activity = state.activities.get(activity_instance_key).ok_or_else(|| {
            KernelError::IllegalState(format!(
                "activity instance {activity_instance_key} of workflow instance {workflow_instance_key} is unknown"
            ))
        })?;
        if activity.task_key != NO_KEY {
            let task: TaskEvent = read_value(context, activity.task_key, "task", |intent| {
                matches!(intent, Intent::Task(_))
            })?;
            let cancel = TaskEvent {
                event_type: TaskEventType::Cancel,
                ..task
            };
            transition.write(RecordKey::Explicit(activity.task_key), &cancel)?;
        }
        transition.write(
            RecordKey::Explicit(activity_instance_key),
            &created.next_at(W::ActivityTerminated, &activity.activity_id),
        )?;
        transition.update(WorkflowUpdate::RemoveActivityInstance {
            activity_instance_key,
        });
    }

    let payload = state
        .payloads
        .get(workflow_instance_key)
        .map(|cached| cached.payload.clone())
        .unwrap_or_else(|| created.payload.clone());
    let canceled = WorkflowInstanceEvent {
        payload,
        ..created.next(W::WorkflowInstanceCanceled)
    };
    let record = transition.write(RecordKey::Explicit(workflow_instance_key), &canceled)?;
    transition.update(WorkflowUpdate::RemoveInstance {
        workflow_instance_key,
    });
    transition.respond(record);
    Ok(transition)
}

/// Reads the value of an earlier event the state points at.
fn read_value<T: crate::event::EventValue>(
    context: &ProcessingContext<'_>,
    position: i64,
    what: &str,
    expected: impl Fn(Intent) -> bool,
) -> Result<T> {
    let event = context.read_event(position)?.ok_or_else(|| {
        KernelError::IllegalState(format!("expected {what} event at log position {position}"))
    })?;
    if !expected(event.intent()) {
        return Err(KernelError::IllegalState(format!(
            "expected {what} event at log position {position}, found {:?}",
            event.intent()
        )));
    }
    event.decode()
}

fn update_payload(state: &WorkflowState, event: &LoggedEvent) -> Result<WorkflowTransition> {
    let command: WorkflowInstanceEvent = event.decode()?;
    let workflow_instance_key = command.workflow_instance_key;
    let parked = event.key != NO_KEY
        && state
            .instances
            .get(workflow_instance_key)
            .is_some_and(|entry| {
                entry.active_token_count > 0 && entry.activity_instance_key == event.key
            });
    let payload = well_formed_payload(&command.payload);

    let mut transition = Transition::none();
    let record = match (parked, payload) {
        (true, Some(payload)) => {
            let activity_id = state
                .activities
                .get(event.key)
                .map(|activity| activity.activity_id.clone())
                .unwrap_or_else(|| command.activity_id.clone());
            let updated = WorkflowInstanceEvent {
                event_type: W::PayloadUpdated,
                activity_id,
                payload: payload.clone(),
                ..command
            };
            let record = transition.write(RecordKey::Explicit(event.key), &updated)?;
            transition.update(WorkflowUpdate::CachePayload {
                workflow_instance_key,
                position: KeyRef::Written(record),
                payload,
            });
            record
        }
        (parked, _) => {
            log::info!(
                "rejecting payload update for activity instance {} of workflow instance {workflow_instance_key}: {}",
                event.key,
                if parked {
                    "payload is not a valid document"
                } else {
                    "instance is not waiting at this activity"
                }
            );
            let rejected = WorkflowInstanceEvent {
                event_type: W::UpdatePayloadRejected,
                ..command
            };
            transition.write(RecordKey::Explicit(event.key), &rejected)?
        }
    };
    transition.respond(record);
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::definition::JsonWorkflowTransformer;
    use crate::processor::testing::{EventLog, log_id};

    fn runtime() -> WorkflowRuntime {
        WorkflowRuntime::new(Arc::new(JsonWorkflowTransformer), &KernelConfig::default())
    }

    fn decode(transition: &WorkflowTransition, index: usize) -> WorkflowInstanceEvent {
        serde_cbor::from_slice(&transition.records[index].value).unwrap()
    }

    #[test]
    fn create_against_missing_deployment_is_rejected() {
        let state = WorkflowState::default();
        let mut log = EventLog::default();
        let event = log.event(3, 3, &WorkflowInstanceEvent::create("order", None, Vec::new()));
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);

        let transition = handle(
            Handler::CreateInstance,
            &state,
            &mut runtime(),
            &context,
            &event,
        )
        .unwrap();
        assert_eq!(transition.records.len(), 1);
        assert_eq!(decode(&transition, 0).event_type, W::WorkflowInstanceRejected);
        assert!(transition.updates.is_empty());
        assert_eq!(transition.response.map(|r| r.record), Some(0));
    }

    #[test]
    fn create_with_malformed_payload_is_rejected() {
        let mut state = WorkflowState::default();
        state.versions.put("order", 1);
        state
            .positions
            .put(WorkflowDefinitionKey::new("order", 1), 1);
        let mut log = EventLog::default();
        let event = log.event(
            3,
            3,
            &WorkflowInstanceEvent::create("order", None, vec![0x83, 0x01]),
        );
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);

        let transition = handle(
            Handler::CreateInstance,
            &state,
            &mut runtime(),
            &context,
            &event,
        )
        .unwrap();
        assert_eq!(decode(&transition, 0).event_type, W::WorkflowInstanceRejected);

        let event = log.event(4, 4, &WorkflowInstanceEvent::create("order", None, Vec::new()));
        let context = ProcessingContext::new(&log_id, &log);
        let transition = handle(
            Handler::CreateInstance,
            &state,
            &mut runtime(),
            &context,
            &event,
        )
        .unwrap();
        let created = decode(&transition, 0);
        assert_eq!(created.event_type, W::WorkflowInstanceCreated);
        assert_eq!(created.version, 1);
        assert_eq!(created.workflow_instance_key, 4);
        assert_eq!(created.payload, EMPTY_MAP);
        assert_eq!(transition.records[0].key, RecordKey::Explicit(4));
    }

    #[test]
    fn events_of_inactive_instances_are_skipped() {
        let state = WorkflowState::default();
        let mut log = EventLog::default();
        let value = WorkflowInstanceEvent {
            workflow_instance_key: 9,
            ..WorkflowInstanceEvent::create("order", Some(1), Vec::new())
        }
        .next_at(W::SequenceFlowTaken, "f1");
        let event = log.event(12, 12, &value);
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);

        let transition = handle(
            Handler::SequenceFlowTaken,
            &state,
            &mut runtime(),
            &context,
            &event,
        )
        .unwrap();
        assert!(transition.is_empty());
    }

    #[test]
    fn stale_task_completion_is_ignored() {
        let mut state = WorkflowState::default();
        state.instances.new_instance(5, 5);
        state.activities.new_activity_instance(9, "pay");
        state.activities.set_task_key(9, 11);
        let task = TaskEvent {
            event_type: TaskEventType::Completed,
            task_type: "payment".into(),
            retries: 3,
            payload: Vec::new(),
            headers: TaskHeaders {
                bpmn_process_id: "order".into(),
                workflow_definition_version: 1,
                workflow_instance_key: 5,
                activity_id: "pay".into(),
                activity_instance_key: 9,
                custom_headers: Vec::new(),
            },
        };
        let mut log = EventLog::default();
        let stale = log.event(20, 10, &task);
        let current = log.event(21, 11, &task);
        let log_id = log_id();
        let context = ProcessingContext::new(&log_id, &log);

        let ignored = handle(Handler::TaskCompleted, &state, &mut runtime(), &context, &stale).unwrap();
        assert!(ignored.is_empty());

        let accepted =
            handle(Handler::TaskCompleted, &state, &mut runtime(), &context, &current).unwrap();
        assert_eq!(decode(&accepted, 0).event_type, W::ActivityCompleting);
        assert_eq!(accepted.records[0].key, RecordKey::Explicit(9));
    }
}
