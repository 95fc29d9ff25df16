//! `brook journal tail` command.

use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};

use crate::opts::{PartitionOpts, open_partition};
use crate::output::{event_json, print_success};

#[derive(Args, Debug)]
pub struct JournalTailArgs {
    /// Position to start from (inclusive)
    #[arg(long, default_value_t = 0)]
    pub from: i64,

    /// Maximum number of events to return
    #[arg(long, default_value_t = 200)]
    pub limit: usize,
}

pub fn cmd_journal_tail(opts: &PartitionOpts, args: &JournalTailArgs) -> Result<()> {
    let partition = open_partition(opts)?;
    let events = partition.controller.events_from(args.from)?;
    let total = events.len();
    let entries = events
        .iter()
        .take(args.limit)
        .map(event_json)
        .collect::<Result<Vec<Value>>>()?;
    print_success(
        opts,
        json!({
            "from": args.from,
            "head": partition.controller.head(),
            "truncated": total > entries.len(),
            "events": entries,
        }),
    )
}
