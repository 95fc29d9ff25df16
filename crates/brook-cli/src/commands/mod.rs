//! Subcommand implementations.
//!
//! Every command opens the partition, lets it catch up with the journal and
//! then acts on it synchronously: a submitted command is processed before
//! the CLI returns, so its response is available right away.

pub mod deploy;
pub mod instance;
pub mod journal;
pub mod snapshot;
pub mod state;
pub mod task;

use anyhow::{Context, Result, anyhow, bail};
use brook_kernel::event::{EventValue, Intent};
use brook_kernel::{Command, LoggedEvent, Response};

use crate::opts::{Partition, PartitionOpts};
use crate::output::{print_success, response_json};

/// Writes `command`, processes the log and returns the command's response.
pub fn execute(partition: &mut Partition, command: Command) -> Result<Response> {
    let intent = command.intent;
    let position = partition
        .controller
        .submit(command)
        .with_context(|| format!("submit {intent:?}"))?;
    partition
        .controller
        .process_available()
        .context("process journal")?;
    let response = partition
        .responses
        .take()
        .into_iter()
        .find(|response| response.request.request_id == position as u64)
        .ok_or_else(|| anyhow!("no response for command at position {position}"))?;
    tracing::info!(position, key = response.key, "command answered");
    Ok(response)
}

/// Prints the response; rejections also fail the command.
pub fn report(opts: &PartitionOpts, response: &Response, rejected: Intent) -> Result<()> {
    print_success(opts, response_json(response)?)?;
    if response.intent == rejected {
        bail!("command rejected with {:?}", response.intent);
    }
    Ok(())
}

/// Reads the event at `position` and decodes it, checking its intent first.
pub fn read_value<T: EventValue>(
    partition: &Partition,
    position: i64,
    accept: impl Fn(Intent) -> bool,
) -> Result<(LoggedEvent, T)> {
    let event = partition
        .controller
        .read_event(position)?
        .ok_or_else(|| anyhow!("no event at position {position}"))?;
    if !accept(event.intent()) {
        bail!("event at position {position} is {:?}, not a {}", event.intent(), T::NAME);
    }
    let value = event.decode()?;
    Ok((event, value))
}
