//! Global CLI options and partition resolution.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use brook_kernel::{KernelConfig, MemResponseSink, StreamProcessorBuilder, StreamProcessorController};
use brook_store::FsStore;
use clap::Args;

/// Global options for CLI commands.
///
/// Kernel settings not covered here are read from `BROOK_*` environment variables.
#[derive(Args, Debug, Clone)]
pub struct PartitionOpts {
    /// Partition directory holding the journal and the store (env: BROOK_DIR)
    #[arg(short = 'd', long, global = true, env = "BROOK_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Replay the whole journal instead of starting from the latest snapshot
    #[arg(long, global = true)]
    pub full_replay: bool,
}

pub type Controller = StreamProcessorController<FsStore>;

/// An opened partition, caught up with its journal.
pub struct Partition {
    pub controller: Controller,
    pub responses: MemResponseSink,
}

pub fn open_partition(opts: &PartitionOpts) -> Result<Partition> {
    let mut config = KernelConfig::from_env().context("read kernel configuration")?;
    if opts.full_replay {
        config.recover_from_snapshot = false;
    }
    std::fs::create_dir_all(&opts.dir)
        .with_context(|| format!("create partition directory {}", opts.dir.display()))?;
    let store = FsStore::open(&opts.dir).context("open store")?;
    let responses = MemResponseSink::new();
    let mut controller = StreamProcessorBuilder::new(Arc::new(store))
        .with_fs_journal(&opts.dir)
        .context("open journal")?
        .with_config(config)
        .with_responses(Box::new(responses.clone()))
        .open()
        .context("recover partition")?;
    let replayed = controller.process_available().context("catch up with journal")?;
    tracing::debug!(replayed, head = controller.head(), "partition ready");
    Ok(Partition {
        controller,
        responses,
    })
}
