//! JSON output helpers.
//!
//! Results are printed to stdout wrapped in `{ "data": ... }`. Payloads are
//! stored as CBOR and shown as JSON.

use anyhow::{Context, Result};
use brook_kernel::event::{EventValue, ValueType};
use brook_kernel::{DeploymentEvent, Intent, LoggedEvent, Response, TaskEvent, WorkflowInstanceEvent};
use serde_json::{Value, json};

use crate::opts::PartitionOpts;

pub fn print_success(opts: &PartitionOpts, data: Value) -> Result<()> {
    let root = json!({ "data": data });
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("{}", serde_json::to_string(&root)?);
    }
    Ok(())
}

/// Parses a `--payload` argument into the stored document format.
pub fn payload_arg(payload: Option<&str>) -> Result<Vec<u8>> {
    let Some(text) = payload else {
        return Ok(Vec::new());
    };
    let value: Value = serde_json::from_str(text).context("payload is not valid JSON")?;
    Ok(serde_cbor::to_vec(&value)?)
}

pub fn payload_json(payload: &[u8]) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    serde_cbor::from_slice(payload)
        .unwrap_or_else(|_| json!({ "undecodable_bytes": payload.len() }))
}

pub fn intent_json(intent: Intent) -> Value {
    serde_json::to_value(intent).unwrap_or(Value::Null)
}

pub fn response_json(response: &Response) -> Result<Value> {
    Ok(json!({
        "key": response.key,
        "position": response.position,
        "intent": intent_json(response.intent),
        "value": value_json(response.intent, &response.value)?,
    }))
}

pub fn event_json(event: &LoggedEvent) -> Result<Value> {
    Ok(json!({
        "position": event.position,
        "key": event.key,
        "intent": intent_json(event.intent()),
        "source_event_position": event.metadata.source_event_position,
        "value": value_json(event.intent(), &event.value)?,
    }))
}

fn value_json(intent: Intent, bytes: &[u8]) -> Result<Value> {
    let value = match intent.value_type() {
        ValueType::Deployment => {
            let event: DeploymentEvent = decode(bytes)?;
            let workflows: Vec<Value> = event
                .deployed_workflows
                .iter()
                .map(|workflow| {
                    json!({
                        "bpmn_process_id": workflow.bpmn_process_id,
                        "version": workflow.version,
                    })
                })
                .collect();
            let mut value = json!({
                "resource_bytes": event.resource.len(),
                "deployed_workflows": workflows,
            });
            if !event.error_message.is_empty() {
                value["error_message"] = Value::String(event.error_message);
            }
            value
        }
        ValueType::WorkflowInstance => {
            let event: WorkflowInstanceEvent = decode(bytes)?;
            json!({
                "bpmn_process_id": event.bpmn_process_id,
                "version": event.version,
                "workflow_instance_key": event.workflow_instance_key,
                "activity_id": event.activity_id,
                "payload": payload_json(&event.payload),
            })
        }
        ValueType::Task => {
            let event: TaskEvent = decode(bytes)?;
            let headers: serde_json::Map<String, Value> = event
                .headers
                .custom_headers
                .iter()
                .map(|header| (header.key.clone(), Value::String(header.value.clone())))
                .collect();
            json!({
                "type": event.task_type,
                "retries": event.retries,
                "payload": payload_json(&event.payload),
                "workflow_instance_key": event.headers.workflow_instance_key,
                "activity_instance_key": event.headers.activity_instance_key,
                "activity_id": event.headers.activity_id,
                "custom_headers": headers,
            })
        }
    };
    Ok(value)
}

fn decode<T: EventValue>(bytes: &[u8]) -> Result<T> {
    serde_cbor::from_slice(bytes).with_context(|| format!("decode {}", T::NAME))
}
