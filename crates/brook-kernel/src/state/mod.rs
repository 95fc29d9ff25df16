//! Persistent indexes owned by the processors.

mod activities;
mod definitions;
mod instances;
mod payloads;

pub use activities::{ActivityInstanceEntry, ActivityInstanceIndex};
pub use definitions::{WorkflowDefinitionKey, WorkflowPositionIndex, WorkflowVersionIndex};
pub use instances::{WorkflowInstanceEntry, WorkflowInstanceIndex};
pub use payloads::{CachedPayload, PayloadCache};
