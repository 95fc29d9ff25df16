//! Compiled workflow graphs, as handed to the processors by a transformer.

mod transform;

use brook_mapping::Mapping;
use indexmap::IndexMap;

use crate::event::TaskHeader;

pub use transform::{
    JsonWorkflowTransformer, Severity, TransformError, ValidationIssue, WorkflowTransformer,
};

pub const DEFAULT_TASK_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    ServiceTask,
    SequenceFlow,
    UserTask,
    ExclusiveGateway,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::StartEvent => "start event",
            ElementKind::EndEvent => "end event",
            ElementKind::ServiceTask => "service task",
            ElementKind::SequenceFlow => "sequence flow",
            ElementKind::UserTask => "user task",
            ElementKind::ExclusiveGateway => "exclusive gateway",
        }
    }

    /// What follows once a structural event for an element of this kind occurred.
    pub fn aspect(&self) -> BpmnAspect {
        match self {
            ElementKind::StartEvent | ElementKind::ServiceTask => BpmnAspect::TakeSequenceFlow,
            ElementKind::EndEvent => BpmnAspect::ConsumeToken,
            _ => BpmnAspect::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BpmnAspect {
    None,
    TakeSequenceFlow,
    ConsumeToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoMapping {
    pub inputs: Vec<Mapping>,
    pub outputs: Vec<Mapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMetadata {
    pub task_type: String,
    pub retries: i32,
    pub headers: Vec<TaskHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowElement {
    pub id: String,
    pub kind: ElementKind,
    /// Ids of the outgoing sequence flows, in document order.
    pub outgoing: Vec<String>,
    /// Target element of a sequence flow.
    pub target: Option<String>,
    pub aspect: BpmnAspect,
    pub io_mapping: IoMapping,
    pub task: Option<TaskMetadata>,
}

impl FlowElement {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            kind,
            outgoing: Vec::new(),
            target: None,
            aspect: kind.aspect(),
            io_mapping: IoMapping::default(),
            task: None,
        }
    }
}

/// One executable process of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledWorkflow {
    pub bpmn_process_id: String,
    elements: IndexMap<String, FlowElement>,
    start_event: String,
}

impl CompiledWorkflow {
    pub fn new(
        bpmn_process_id: impl Into<String>,
        elements: IndexMap<String, FlowElement>,
        start_event: impl Into<String>,
    ) -> Self {
        Self {
            bpmn_process_id: bpmn_process_id.into(),
            elements,
            start_event: start_event.into(),
        }
    }

    pub fn element(&self, id: &str) -> Option<&FlowElement> {
        self.elements.get(id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &FlowElement> {
        self.elements.values()
    }

    pub fn scope_start_event(&self) -> Option<&FlowElement> {
        self.element(&self.start_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspects_by_kind() {
        assert_eq!(ElementKind::StartEvent.aspect(), BpmnAspect::TakeSequenceFlow);
        assert_eq!(ElementKind::ServiceTask.aspect(), BpmnAspect::TakeSequenceFlow);
        assert_eq!(ElementKind::EndEvent.aspect(), BpmnAspect::ConsumeToken);
        assert_eq!(ElementKind::UserTask.aspect(), BpmnAspect::None);
        assert_eq!(ElementKind::SequenceFlow.aspect(), BpmnAspect::None);
    }
}
