//! `brook snapshot` command.

use anyhow::Result;
use serde_json::json;

use crate::opts::{PartitionOpts, open_partition};
use crate::output::print_success;

pub fn cmd_snapshot(opts: &PartitionOpts) -> Result<()> {
    let mut partition = open_partition(opts)?;
    let record = partition.controller.create_snapshot()?;
    print_success(
        opts,
        json!({
            "snapshot_ref": record.snapshot_ref,
            "processed_position": record.processed_position,
        }),
    )
}
