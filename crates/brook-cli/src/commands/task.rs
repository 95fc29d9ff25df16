//! `brook complete` command.

use anyhow::Result;
use brook_kernel::event::TaskEventType;
use brook_kernel::{Command, Intent, TaskEvent};
use clap::Args;
use serde_json::json;

use crate::opts::{PartitionOpts, open_partition};
use crate::output::{payload_arg, print_success};

use super::read_value;

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Task key, the position of the task's CREATE event
    pub task_key: i64,

    /// Task result payload as a JSON object
    #[arg(long)]
    pub payload: Option<String>,
}

pub fn cmd_complete(opts: &PartitionOpts, args: &CompleteArgs) -> Result<()> {
    let payload = payload_arg(args.payload.as_deref())?;
    let mut partition = open_partition(opts)?;
    let (_, task): (_, TaskEvent) = read_value(&partition, args.task_key, |intent| {
        intent == Intent::Task(TaskEventType::Create)
    })?;
    let command = Command::complete_task(args.task_key, &task, payload)?;
    let position = partition.controller.submit(command)?;
    partition.controller.process_available()?;

    let workflow_instance_key = task.headers.workflow_instance_key;
    let state = partition.controller.workflow_state();
    print_success(
        opts,
        json!({
            "position": position,
            "workflow_instance_key": workflow_instance_key,
            "instance_active": state.instances.is_active(workflow_instance_key),
        }),
    )
}
