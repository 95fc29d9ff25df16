mod commands;
mod opts;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::deploy::DeployArgs;
use commands::instance::{CancelArgs, CreateArgs, UpdatePayloadArgs};
use commands::journal::JournalTailArgs;
use commands::task::CompleteArgs;
use opts::PartitionOpts;

#[derive(Parser, Debug)]
#[command(name = "brook", version, about = "Workflow partition processor CLI")]
struct Cli {
    #[command(flatten)]
    opts: PartitionOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a workflow definition file
    Deploy(DeployArgs),

    /// Create a workflow instance
    Create(CreateArgs),

    /// Cancel a workflow instance
    Cancel(CancelArgs),

    /// Replace the payload of a waiting activity
    UpdatePayload(UpdatePayloadArgs),

    /// Complete a task as a worker would
    Complete(CompleteArgs),

    /// Show journal information
    #[command(subcommand)]
    Journal(JournalCommand),

    /// Snapshot the processor state
    Snapshot,

    /// Show deployments and running instances
    State,
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    /// List events from the partition log
    Tail(JournalTailArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();
    let opts = &cli.opts;

    match &cli.command {
        Command::Deploy(args) => commands::deploy::cmd_deploy(opts, args),
        Command::Create(args) => commands::instance::cmd_create(opts, args),
        Command::Cancel(args) => commands::instance::cmd_cancel(opts, args),
        Command::UpdatePayload(args) => commands::instance::cmd_update_payload(opts, args),
        Command::Complete(args) => commands::task::cmd_complete(opts, args),
        Command::Journal(cmd) => match cmd {
            JournalCommand::Tail(args) => commands::journal::cmd_journal_tail(opts, args),
        },
        Command::Snapshot => commands::snapshot::cmd_snapshot(opts),
        Command::State => commands::state::cmd_state(opts),
    }
}

/// Logs go to stderr so stdout stays machine readable.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
