//! Partition stream processor: deployments, workflow instances and their state.

pub mod cache;
pub mod command;
pub mod config;
pub mod controller;
pub mod definition;
pub mod error;
pub mod event;
pub mod index;
pub mod journal;
pub mod processor;
pub mod response;
pub mod snapshot;
pub mod state;

pub use command::Command;
pub use config::{ConfigError, KernelConfig};
pub use controller::{StreamProcessorBuilder, StreamProcessorController};
pub use definition::{CompiledWorkflow, JsonWorkflowTransformer, WorkflowTransformer};
pub use error::KernelError;
pub use event::{
    DeploymentEvent, DeploymentEventType, Intent, LoggedEvent, TaskEvent, TaskEventType,
    WorkflowInstanceEvent, WorkflowInstanceEventType,
};
pub use journal::fs::FsJournal;
pub use journal::mem::MemJournal;
pub use journal::{Journal, LogPosition};
pub use processor::workflow::WorkflowState;
pub use response::{DiscardResponses, MemResponseSink, Response, ResponseSink};
