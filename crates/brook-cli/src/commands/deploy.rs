//! `brook deploy` command.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use brook_kernel::event::DeploymentEventType;
use brook_kernel::{Command, Intent};
use clap::Args;

use crate::opts::{PartitionOpts, open_partition};

use super::{execute, report};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Workflow definition file (JSON)
    pub file: PathBuf,
}

pub fn cmd_deploy(opts: &PartitionOpts, args: &DeployArgs) -> Result<()> {
    let resource =
        fs::read(&args.file).with_context(|| format!("read {}", args.file.display()))?;
    let mut partition = open_partition(opts)?;
    let response = execute(&mut partition, Command::deploy(resource)?)?;
    report(
        opts,
        &response,
        Intent::Deployment(DeploymentEventType::DeploymentRejected),
    )
}
