//! `brook state` command.

use anyhow::Result;
use serde_json::{Value, json};

use crate::opts::{PartitionOpts, open_partition};
use crate::output::{payload_json, print_success};

pub fn cmd_state(opts: &PartitionOpts) -> Result<()> {
    let partition = open_partition(opts)?;
    let controller = &partition.controller;
    let state = controller.workflow_state();

    let deployments: serde_json::Map<String, Value> = controller
        .deployed_versions()
        .iter()
        .map(|(id, version)| (id.to_string(), json!(version)))
        .collect();

    let instances: Vec<Value> = state
        .instances
        .iter()
        .map(|(key, entry)| {
            let activity = state.activities.get(entry.activity_instance_key);
            json!({
                "workflow_instance_key": key,
                "active_tokens": entry.active_token_count,
                "activity_instance_key": activity.map(|_| entry.activity_instance_key),
                "activity_id": activity.map(|activity| activity.activity_id.as_str()),
                "task_key": activity.map(|activity| activity.task_key),
                "payload": state.payloads.get(key).map(|cached| payload_json(&cached.payload)),
            })
        })
        .collect();

    print_success(
        opts,
        json!({
            "position": controller.position(),
            "head": controller.head(),
            "deployments": deployments,
            "instances": instances,
        }),
    )
}
