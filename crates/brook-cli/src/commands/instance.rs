//! `brook create`, `brook cancel` and `brook update-payload` commands.

use anyhow::Result;
use brook_kernel::event::WorkflowInstanceEventType as W;
use brook_kernel::{Command, Intent, WorkflowInstanceEvent};
use clap::Args;

use crate::opts::{PartitionOpts, open_partition};
use crate::output::payload_arg;

use super::{execute, read_value, report};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Process id of the deployed workflow
    pub bpmn_process_id: String,

    /// Deployed version to start (default: latest)
    #[arg(long)]
    pub version: Option<i32>,

    /// Instance payload as a JSON object
    #[arg(long)]
    pub payload: Option<String>,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Workflow instance key
    pub workflow_instance_key: i64,
}

#[derive(Args, Debug)]
pub struct UpdatePayloadArgs {
    /// Activity instance key of the waiting activity
    pub activity_instance_key: i64,

    /// New payload as a JSON object
    #[arg(long)]
    pub payload: String,
}

pub fn cmd_create(opts: &PartitionOpts, args: &CreateArgs) -> Result<()> {
    let payload = payload_arg(args.payload.as_deref())?;
    let mut partition = open_partition(opts)?;
    let command = Command::create_instance(&args.bpmn_process_id, args.version, payload)?;
    let response = execute(&mut partition, command)?;
    report(
        opts,
        &response,
        Intent::WorkflowInstance(W::WorkflowInstanceRejected),
    )
}

pub fn cmd_cancel(opts: &PartitionOpts, args: &CancelArgs) -> Result<()> {
    let mut partition = open_partition(opts)?;
    let response = execute(
        &mut partition,
        Command::cancel_instance(args.workflow_instance_key)?,
    )?;
    report(
        opts,
        &response,
        Intent::WorkflowInstance(W::CancelWorkflowInstanceRejected),
    )
}

pub fn cmd_update_payload(opts: &PartitionOpts, args: &UpdatePayloadArgs) -> Result<()> {
    let payload = payload_arg(Some(&args.payload))?;
    let mut partition = open_partition(opts)?;
    // The activity instance key is the position of its ACTIVITY_READY event.
    let (_, ready): (_, WorkflowInstanceEvent) =
        read_value(&partition, args.activity_instance_key, |intent| {
            intent == Intent::WorkflowInstance(W::ActivityReady)
        })?;
    let command = Command::update_payload(
        args.activity_instance_key,
        ready.workflow_instance_key,
        payload,
    )?;
    let response = execute(&mut partition, command)?;
    report(
        opts,
        &response,
        Intent::WorkflowInstance(W::UpdatePayloadRejected),
    )
}
